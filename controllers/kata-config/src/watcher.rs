//! KataConfig watch loop.
//!
//! Built on `kube_runtime::Controller`, which handles reconnection and
//! retries. KataConfig is the primary resource. Objects the reconciler
//! creates come back through their owner reference, and pool, node and
//! image job changes re-trigger every KataConfig.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::well_known::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crds::{KataConfig, MachineConfig, MachineConfigPool};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::node::v1::RuntimeClass;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Forces the API server to close idle watches before the client times out
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Node heartbeats arrive constantly; batch them into one reconcile
const DEBOUNCE: Duration = Duration::from_secs(5);

async fn reconcile(kata_config: Arc<KataConfig>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let name = kata_config.name_any();
    debug!("Reconciling KataConfig {}", name);
    reconciler.reconcile(&name).await
}

fn error_policy(kata_config: Arc<KataConfig>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    error!("Reconciliation error for KataConfig {}: {}", kata_config.name_any(), error);
    Action::requeue(reconciler.config().requeue_interval)
}

/// Map any change to a reconcile of every known KataConfig
fn every_kata_config<W: 'static>(store: Store<KataConfig>) -> impl Fn(W) -> Vec<ObjectRef<KataConfig>> + Send + Sync + 'static {
    move |_| {
        store
            .state()
            .iter()
            .map(|kc| ObjectRef::from_obj(kc.as_ref()))
            .collect()
    }
}

/// Watches KataConfigs and everything their rollout depends on.
pub struct Watcher {
    client: Client,
    reconciler: Arc<Reconciler>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

impl Watcher {
    pub fn new(client: Client, reconciler: Arc<Reconciler>) -> Self {
        Self { client, reconciler }
    }

    /// Run until a termination signal arrives
    pub async fn watch_kata_configs(&self) -> Result<(), ControllerError> {
        info!("Starting KataConfig watcher");
        let namespace = self.reconciler.config().namespace.clone();
        let config = || watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);
        let managed = || config().labels(&format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE));

        let kata_configs: Api<KataConfig> = Api::all(self.client.clone());
        let controller = Controller::new(kata_configs, config());
        let store = controller.store();

        controller
            .with_config(ControllerConfig::default().debounce(DEBOUNCE).concurrency(1))
            .owns(Api::<MachineConfig>::all(self.client.clone()), config())
            .owns(Api::<RuntimeClass>::all(self.client.clone()), config())
            .owns(Api::<DaemonSet>::namespaced(self.client.clone(), &namespace), managed())
            .watches(
                Api::<MachineConfigPool>::all(self.client.clone()),
                config(),
                every_kata_config(store.clone()),
            )
            .watches(Api::<Node>::all(self.client.clone()), config(), every_kata_config(store.clone()))
            .watches(
                Api::<Job>::namespaced(self.client.clone(), &namespace),
                managed(),
                every_kata_config(store),
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!("Reconciled {}: {:?}", obj.name, action),
                    Err(e) => error!("Controller error for KataConfig: {}", e),
                }
            })
            .await;

        info!("KataConfig watcher stopped");
        Ok(())
    }
}
