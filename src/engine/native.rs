//! In-process engine built on gstreamer-rs.
//!
//! Runs the same textual descriptions as gstd, but inside this process. Useful
//! on hosts where the daemon is not installed. The interpipe plugin must
//! still be available. Element signals are not exposed, so frame-counter
//! reporting is unavailable with this engine.

// Standard library imports
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// External crate imports
use async_trait::async_trait;
use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use tracing::{debug, info};

// Internal module imports
use super::daemon::EngineHost;
use super::{BusMessage, EngineError, EngineResult, PipelineEngine};

/// Parse `text` into a value the property accepts.
///
/// Setting an unwritable property or a value of the wrong type aborts inside
/// glib, so both are turned into rejections before anything is set.
fn property_value(pspec: &glib::ParamSpec, text: &str) -> EngineResult<glib::Value> {
    if !pspec.flags().contains(glib::ParamFlags::WRITABLE) {
        return Err(EngineError::Rejected {
            code: -1,
            description: format!("property {} is not writable", pspec.name()),
        });
    }
    glib::Value::deserialize(text, pspec.value_type()).map_err(|e| EngineError::Rejected {
        code: -1,
        description: format!("invalid value {text:?} for {}: {e}", pspec.name()),
    })
}

/// Engine holding live `gst::Pipeline`s by name.
#[derive(Debug, Default)]
pub struct NativeEngine {
    pipelines: Mutex<HashMap<String, gst::Pipeline>>,
}

impl NativeEngine {
    /// Initialize GStreamer and create an empty engine.
    pub fn new() -> EngineResult<Self> {
        gst::init().map_err(|e| EngineError::Transport(format!("gstreamer init: {e}")))?;
        info!(version = %gst::version_string(), "native GStreamer engine ready");
        Ok(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, gst::Pipeline>> {
        self.pipelines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pipeline(&self, name: &str) -> EngineResult<gst::Pipeline> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    fn set_state(&self, name: &str, state: gst::State) -> EngineResult<()> {
        let pipeline = self.pipeline(name)?;
        debug!(pipeline = name, ?state, "native set state");
        pipeline
            .set_state(state)
            .map(|_| ())
            .map_err(|e| EngineError::Rejected {
                code: -1,
                description: format!("state change to {state:?} failed: {e}"),
            })
    }
}

#[async_trait]
impl PipelineEngine for NativeEngine {
    async fn create(&self, name: &str, description: &str) -> EngineResult<()> {
        if self.lock().contains_key(name) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }

        let invalid = |reason: String| EngineError::InvalidDescription {
            name: name.to_string(),
            reason,
        };
        let element = gst::parse::launch(description).map_err(|e| invalid(e.to_string()))?;
        let pipeline = element
            .downcast::<gst::Pipeline>()
            .map_err(|_| invalid("description is not a pipeline".to_string()))?;

        let mut pipelines = self.lock();
        if pipelines.contains_key(name) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        pipelines.insert(name.to_string(), pipeline);
        Ok(())
    }

    async fn play(&self, name: &str) -> EngineResult<()> {
        self.set_state(name, gst::State::Playing)
    }

    async fn stop(&self, name: &str) -> EngineResult<()> {
        self.set_state(name, gst::State::Null)
    }

    async fn delete(&self, name: &str) -> EngineResult<()> {
        let pipeline = self
            .lock()
            .remove(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        let _ = pipeline.set_state(gst::State::Null);
        Ok(())
    }

    async fn send_eos(&self, name: &str) -> EngineResult<()> {
        let pipeline = self.pipeline(name)?;
        if pipeline.send_event(gst::event::Eos::new()) {
            Ok(())
        } else {
            Err(EngineError::Rejected {
                code: -1,
                description: "EOS event not handled".to_string(),
            })
        }
    }

    async fn set_property(
        &self,
        name: &str,
        element: &str,
        property: &str,
        value: &str,
    ) -> EngineResult<()> {
        let pipeline = self.pipeline(name)?;
        let target = pipeline
            .by_name(element)
            .ok_or_else(|| EngineError::NotFound(format!("{name}.{element}")))?;
        let pspec = target
            .find_property(property)
            .ok_or_else(|| EngineError::NotFound(format!("{name}.{element}.{property}")))?;
        let value = property_value(&pspec, value)?;
        target.set_property_from_value(property, &value);
        Ok(())
    }

    async fn wait_signal(&self, _name: &str, _element: &str, _signal: &str) -> EngineResult<()> {
        Err(EngineError::Unsupported("element signal callbacks"))
    }

    async fn next_bus_message(
        &self,
        name: &str,
        timeout: Duration,
    ) -> EngineResult<Option<BusMessage>> {
        let bus = self
            .pipeline(name)?
            .bus()
            .ok_or_else(|| EngineError::NotFound(format!("{name} bus")))?;
        let wait = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);

        let message = tokio::task::spawn_blocking(move || bus.timed_pop(wait))
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        Ok(message.map(|msg| {
            let text = match msg.view() {
                gst::MessageView::Error(err) => err.error().to_string(),
                gst::MessageView::Warning(warn) => warn.error().to_string(),
                _ => msg
                    .structure()
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            };
            BusMessage {
                kind: format!("{:?}", msg.type_()).to_lowercase(),
                source: msg.src().map(|s| s.name().to_string()).unwrap_or_default(),
                text,
            }
        }))
    }
}

#[async_trait]
impl EngineHost for NativeEngine {
    async fn terminate(&self) -> EngineResult<()> {
        for (name, pipeline) in self.lock().drain() {
            debug!(pipeline = %name, "releasing native pipeline");
            let _ = pipeline.set_state(gst::State::Null);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_property(property: &str) -> glib::ParamSpec {
        gst::init().unwrap();
        let queue = gst::ElementFactory::make("queue").build().unwrap();
        queue.find_property(property).unwrap()
    }

    #[test]
    fn test_property_value_parses_to_property_type() {
        let pspec = queue_property("max-size-bytes");
        let value = property_value(&pspec, "1048576").unwrap();
        assert_eq!(value.get::<u32>().unwrap(), 1_048_576);
    }

    #[test]
    fn test_property_value_rejects_bad_text() {
        let pspec = queue_property("max-size-bytes");
        assert!(matches!(
            property_value(&pspec, "lots"),
            Err(EngineError::Rejected { code: -1, .. })
        ));
    }

    #[test]
    fn test_property_value_rejects_read_only() {
        let pspec = queue_property("current-level-bytes");
        assert!(matches!(
            property_value(&pspec, "0"),
            Err(EngineError::Rejected { .. })
        ));
    }
}
