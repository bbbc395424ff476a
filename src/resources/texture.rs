use crate::{
    error::{EngineError, EngineResult},
    resources::load_binary,
};

/// Fetches and decodes an image. The file type is guessed from its content.
pub async fn load_image(path: &str) -> EngineResult<image::DynamicImage> {
    let bytes = load_binary(path).await.map_err(|e| EngineError::TextureLoad {
        path: path.to_string(),
        reason: format!("{e:#}"),
    })?;
    decode_image(path, &bytes)
}

pub fn decode_image(path: &str, bytes: &[u8]) -> EngineResult<image::DynamicImage> {
    let image = image::load_from_memory(bytes).map_err(|e| EngineError::TextureLoad {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    if image.width() == 0 || image.height() == 0 {
        return Err(EngineError::TextureLoad {
            path: path.to_string(),
            reason: "image is empty".to_string(),
        });
    }
    Ok(image)
}
