//! Watch-driven reconcile loop on top of `kube::runtime::Controller`.
//!
//! The runtime serializes reconciles per tenant and coalesces events, so the
//! engine never sees two concurrent passes for the same name.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace as KubeNamespace, ResourceQuota as KubeResourceQuota, Secret as KubeSecret};
use k8s_openapi::api::networking::v1::NetworkPolicy as KubeNetworkPolicy;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::models::ReconcileConfig;
use crate::services::{ConvergenceEngine, ReconcileOutcome};

use super::crd::TenantResource;

/// Shared state handed to every reconcile.
pub struct ControllerContext {
    pub engine: Arc<ConvergenceEngine>,
    pub config: ReconcileConfig,
}

/// Map an engine outcome onto a runtime action.
pub fn action_for(outcome: ReconcileOutcome, config: &ReconcileConfig) -> Action {
    match outcome {
        ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::Requeue => Action::requeue(Duration::from_secs(config.requeue_secs)),
    }
}

async fn reconcile(tenant: Arc<TenantResource>, ctx: Arc<ControllerContext>) -> Result<Action, DomainError> {
    let outcome = ctx.engine.reconcile(&tenant.name_any()).await?;
    Ok(action_for(outcome, &ctx.config))
}

fn error_policy(tenant: Arc<TenantResource>, error: &DomainError, ctx: Arc<ControllerContext>) -> Action {
    warn!(tenant = %tenant.name_any(), error = %error, "reconcile failed, requeueing");
    Action::requeue(Duration::from_secs(ctx.config.error_requeue_secs))
}

/// Run the tenant controller until a termination signal arrives.
pub async fn run_controller(client: Client, engine: Arc<ConvergenceEngine>, config: ReconcileConfig) {
    let tenants: Api<TenantResource> = Api::all(client.clone());
    let ctx = Arc::new(ControllerContext { engine, config });

    info!("tenant controller starting");
    Controller::new(tenants, watcher::Config::default())
        .owns(Api::<KubeNamespace>::all(client.clone()), watcher::Config::default())
        .owns(Api::<KubeResourceQuota>::all(client.clone()), watcher::Config::default())
        .owns(Api::<KubeNetworkPolicy>::all(client.clone()), watcher::Config::default())
        .owns(Api::<KubeSecret>::all(client), watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => debug!(tenant = %object.name, ?action, "reconciled"),
                Err(e) => warn!(error = %e, "controller error"),
            }
        })
        .await;
    info!("tenant controller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions() {
        let config = ReconcileConfig {
            requeue_secs: 2,
            error_requeue_secs: 5,
        };
        assert_eq!(action_for(ReconcileOutcome::Done, &config), Action::await_change());
        assert_eq!(
            action_for(ReconcileOutcome::Requeue, &config),
            Action::requeue(Duration::from_secs(2))
        );
    }
}
