//! Image presence resolution

use super::{DeployError, DeployStep};
use crate::engine::ContainerEngine;
use crate::progress::{ProgressSink, Stage};
use tracing::debug;

/// How the image requirement was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    /// Already cached locally
    Present,
    /// Pulled during this deployment
    Pulled,
}

/// Make sure `reference` exists locally, pulling it when the engine reports
/// it missing. Any other inspection failure aborts.
pub async fn ensure_image(
    engine: &dyn ContainerEngine,
    reference: &str,
    sink: &dyn ProgressSink,
) -> Result<ImageStatus, DeployError> {
    match engine.inspect_image(reference).await {
        Ok(details) => {
            debug!(image = %reference, image_id = %details.id, "Image found locally");
            sink.record(
                Some(Stage::ImageCheck),
                &format!("Image {} already exists locally", reference),
            );
            Ok(ImageStatus::Present)
        }
        Err(err) if err.is_not_found() => {
            sink.record(Some(Stage::ImagePull), &format!("Pulling image: {}", reference));
            engine
                .pull_image(reference)
                .await
                .map_err(|source| DeployError::engine(DeployStep::PullImage, source))?;
            sink.record(
                Some(Stage::ImagePull),
                &format!("Image pulled successfully: {}", reference),
            );
            Ok(ImageStatus::Pulled)
        }
        Err(source) => Err(DeployError::engine(DeployStep::InspectImage, source)),
    }
}
