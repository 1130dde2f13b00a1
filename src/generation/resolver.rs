//! JSON source resolution.
//!
//! Remote sources are handed to the engine as a URL parameter and fetched by
//! the design at render time. Local sources are decoded and the whole document
//! is set on every string parameter the design declares; picking fields out of
//! the blob is the design's job.

use log::debug;

use super::engine::{DesignHandle, RenderTask, ReportEngine};
use super::{GenerationError, JsonSource};

/// Parameter carrying the remote data URL.
pub const JSON_URL_PARAMETER: &str = "json";
/// Payload placeholder, left empty in remote mode.
pub const JSON_PAYLOAD_PARAMETER: &str = "JsonSource";

/// Fills `task` from `source`. Returns the number of parameters set.
pub fn resolve(
    engine: &mut dyn ReportEngine,
    design: &DesignHandle,
    source: &JsonSource,
    task: &mut RenderTask,
) -> Result<usize, GenerationError> {
    match source {
        JsonSource::RemoteUrl(url) => {
            task.set_parameter(JSON_PAYLOAD_PARAMETER, "");
            task.set_parameter(JSON_URL_PARAMETER, url.as_str());
            debug!("Remote JSON source {} bound to design '{}'", url, design.name);
            Ok(2)
        }
        JsonSource::LocalBytes(bytes) => {
            let json = std::str::from_utf8(bytes).map_err(|e| {
                GenerationError::SourceRead(format!("JSON source is not valid UTF-8: {}", e))
            })?;

            let mut injected = 0;
            for definition in engine.parameter_definitions(design)? {
                if definition.is_string() {
                    task.set_parameter(definition.name, json);
                    injected += 1;
                }
            }
            debug!(
                "Local JSON source ({} bytes) injected into {} string parameter(s) of '{}'",
                bytes.len(),
                injected,
                design.name
            );
            Ok(injected)
        }
    }
}
