//! Watch-driven event source: turns the kube watcher stream into
//! add/update/delete callbacks on an [`EventSink`].

use std::sync::Arc;

use acr_core::{AppKey, Application, EventSink};
use futures::StreamExt;
use kube::{
    api::Api,
    core::DynamicObject,
    runtime::{
        watcher::{self, Event},
        WatchStreamExt,
    },
};
use metrics::counter;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::to_application;

/// Informer-style notification derived from a watch event.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Add(Application),
    Update(Application),
    Delete(Application),
}

impl Notification {
    pub async fn dispatch(self, sink: &dyn EventSink) {
        match self {
            Notification::Add(app) => sink.on_add(app).await,
            Notification::Update(app) => sink.on_update(app).await,
            Notification::Delete(app) => sink.on_delete(app).await,
        }
    }
}

/// Tracks which Applications the watch has reported so that `Applied`
/// events can be split into adds and updates, and a relist can surface
/// objects deleted while the watch was down.
#[derive(Default)]
pub struct EventTranslator {
    known: FxHashMap<AppKey, Application>,
}

impl EventTranslator {
    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    pub fn translate(&mut self, event: Event<Application>) -> Vec<Notification> {
        match event {
            Event::Applied(app) => {
                let seen = self.known.insert(app.key(), app.clone()).is_some();
                vec![if seen { Notification::Update(app) } else { Notification::Add(app) }]
            }
            Event::Deleted(app) => {
                self.known.remove(&app.key());
                vec![Notification::Delete(app)]
            }
            Event::Restarted(list) => {
                let mut fresh: FxHashMap<AppKey, Application> = FxHashMap::default();
                let mut out = Vec::with_capacity(list.len());
                for app in list {
                    let key = app.key();
                    if self.known.contains_key(&key) {
                        out.push(Notification::Update(app.clone()));
                    } else {
                        out.push(Notification::Add(app.clone()));
                    }
                    fresh.insert(key, app);
                }
                let mut gone: Vec<(AppKey, Application)> =
                    self.known.drain().filter(|(k, _)| !fresh.contains_key(k)).collect();
                gone.sort_by(|a, b| a.0.cmp(&b.0));
                out.extend(gone.into_iter().map(|(_, app)| Notification::Delete(app)));
                self.known = fresh;
                out
            }
        }
    }
}

fn decode_object(obj: &DynamicObject) -> Option<Application> {
    match to_application(obj) {
        Ok(app) => Some(app),
        Err(e) => {
            counter!("acr_watch_decode_errors_total", 1u64);
            warn!(name = ?obj.metadata.name, ns = ?obj.metadata.namespace, error = %e, "skipping undecodable application");
            None
        }
    }
}

/// Decode a dynamic watch event; undecodable objects are dropped (and for a
/// relist, left out of the list).
pub fn decode_event(event: Event<DynamicObject>) -> Option<Event<Application>> {
    match event {
        Event::Applied(o) => decode_object(&o).map(Event::Applied),
        Event::Deleted(o) => decode_object(&o).map(Event::Deleted),
        Event::Restarted(list) => Some(Event::Restarted(list.iter().filter_map(decode_object).collect())),
    }
}

/// Watch Applications through `api` and feed `sink` until `cancel` fires or
/// the stream ends. Watch errors are logged; the watcher backs off and
/// resumes on its own.
pub async fn run_event_source(api: Api<DynamicObject>, sink: Arc<dyn EventSink>, cancel: CancellationToken) {
    let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
    futures::pin_mut!(stream);
    let mut translator = EventTranslator::default();
    let mut synced = false;
    info!("application watcher started");
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                info!("application watcher cancelled");
                return;
            }
            next = stream.next() => next,
        };
        match next {
            Some(Ok(ev)) => {
                synced = true;
                if let Event::Restarted(list) = &ev {
                    debug!(count = list.len(), "watch restart");
                }
                let Some(ev) = decode_event(ev) else { continue };
                for n in translator.translate(ev) {
                    counter!("acr_watch_events_total", 1u64);
                    n.dispatch(sink.as_ref()).await;
                }
            }
            Some(Err(e)) => {
                counter!("acr_watch_errors_total", 1u64);
                if synced {
                    warn!(error = %e, "application watch error; backing off");
                } else {
                    error!(error = %e, "application watcher failed to start; retrying with backoff");
                }
            }
            None => {
                warn!("application watch stream ended");
                return;
            }
        }
    }
}
