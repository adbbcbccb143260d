//! Watch provider backed by the Kubernetes API
//!
//! Resource types are resolved through API discovery, then watched across all
//! namespaces with one list/watch stream per subscription.

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::core::GroupVersion;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Client, ResourceExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use topowatch_core::models::{RawObject, ResourceType};
use topowatch_pipeline::watcher::{ResourceEventHandler, Subscription, WatchProvider};
use topowatch_pipeline::{Error, Result};
use tracing::{debug, error, info, warn};

use crate::informer_store::{InformerStore, StoreEvent};

pub struct KubeWatchProvider {
    client: Client,
}

impl KubeWatchProvider {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    async fn resolve(&self, resource: &ResourceType) -> Result<ApiResource> {
        let subscription_error = |reason: String| Error::Subscription {
            resource: resource.to_string(),
            reason,
        };

        let group_version = resource.group_version();
        let gv: GroupVersion = group_version
            .parse()
            .map_err(|e| subscription_error(format!("{e}")))?;
        let group = kube::discovery::pinned_group(&self.client, &gv)
            .await
            .map_err(|e| subscription_error(e.to_string()))?;

        group
            .versioned_resources(&resource.version)
            .into_iter()
            .find(|(ar, _)| ar.plural == resource.resource)
            .map(|(ar, _)| ar)
            .ok_or_else(|| {
                subscription_error(format!("no resource '{}' in {group_version}", resource.resource))
            })
    }
}

#[async_trait]
impl WatchProvider for KubeWatchProvider {
    async fn subscribe(
        &self,
        resource: &ResourceType,
        handler: Arc<dyn ResourceEventHandler>,
    ) -> Result<Box<dyn Subscription>> {
        let api_resource = self.resolve(resource).await?;
        debug!(resource = %resource, kind = %api_resource.kind, "Resolved resource");

        let (synced, _) = watch::channel(false);
        Ok(Box::new(KubeSubscription {
            resource: resource.clone(),
            api: Api::all_with(self.client.clone(), &api_resource),
            api_resource,
            handler,
            synced,
            task: Mutex::new(None),
        }))
    }
}

struct KubeSubscription {
    resource: ResourceType,
    api: Api<DynamicObject>,
    api_resource: ApiResource,
    handler: Arc<dyn ResourceEventHandler>,
    synced: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription for KubeSubscription {
    fn resource(&self) -> &ResourceType {
        &self.resource
    }

    fn start(&self, shutdown: CancellationToken) {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!(resource = %self.resource, "Subscription already started");
            return;
        }

        let stream = SubscriptionStream {
            resource: self.resource.clone(),
            api: self.api.clone(),
            api_resource: self.api_resource.clone(),
            handler: Arc::clone(&self.handler),
            synced: self.synced.clone(),
        };
        *task = Some(tokio::spawn(stream.run(shutdown)));
    }

    fn synced(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }
}

struct SubscriptionStream {
    resource: ResourceType,
    api: Api<DynamicObject>,
    api_resource: ApiResource,
    handler: Arc<dyn ResourceEventHandler>,
    synced: watch::Sender<bool>,
}

impl SubscriptionStream {
    async fn run(self, shutdown: CancellationToken) {
        let mut store = InformerStore::default();
        let mut events = watcher::watcher(self.api.clone(), watcher::Config::default())
            .default_backoff()
            .boxed();

        info!(resource = %self.resource, "Watching resource");
        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => break,
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    let Some(event) = self.convert(event) else {
                        continue;
                    };
                    if store.handle(event, self.handler.as_ref()) {
                        self.synced.send_replace(true);
                        debug!(resource = %self.resource, objects = store.len(), "List complete");
                    }
                }
                Some(Err(e)) => {
                    warn!(resource = %self.resource, error = %e, "Watch error, retrying with backoff");
                }
                None => {
                    error!(resource = %self.resource, "Watch stream ended");
                    break;
                }
            }
        }
        info!(resource = %self.resource, "Stopped watching resource");
    }

    fn convert(&self, event: Event<DynamicObject>) -> Option<StoreEvent> {
        Some(match event {
            Event::Init => StoreEvent::Init,
            Event::InitDone => StoreEvent::InitDone,
            Event::InitApply(obj) => {
                let (key, object) = self.to_raw(&obj)?;
                StoreEvent::InitApply { key, object }
            }
            Event::Apply(obj) => {
                let (key, object) = self.to_raw(&obj)?;
                StoreEvent::Apply { key, object }
            }
            Event::Delete(obj) => {
                let (key, object) = self.to_raw(&obj)?;
                StoreEvent::Delete { key, object }
            }
        })
    }

    /// `namespace/name` key and JSON document for `obj`
    ///
    /// List items may come without type information; it is filled in from the
    /// resolved resource.
    fn to_raw(&self, obj: &DynamicObject) -> Option<(String, RawObject)> {
        let key = match obj.namespace() {
            Some(namespace) => format!("{namespace}/{}", obj.name_any()),
            None => obj.name_any(),
        };

        let mut value = match serde_json::to_value(obj) {
            Ok(value) => value,
            Err(e) => {
                error!(resource = %self.resource, key = %key, error = %e, "Could not serialize object");
                return None;
            }
        };
        if let Some(map) = value.as_object_mut() {
            map.entry("apiVersion")
                .or_insert_with(|| Value::String(self.api_resource.api_version.clone()));
            map.entry("kind")
                .or_insert_with(|| Value::String(self.api_resource.kind.clone()));
        }
        Some((key, Arc::new(value)))
    }
}
