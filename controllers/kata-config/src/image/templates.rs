//! Image job templates
//!
//! One job manifest per provider and operation, named
//! `<provider>-podvm-image-<create|delete>.yaml`.

use super::job::ImageOperation;
use crate::error::ControllerError;
use std::path::PathBuf;

/// Source of raw job template manifests
pub trait JobTemplateSource: Send + Sync {
    fn load(&self, provider: &str, operation: ImageOperation) -> Result<String, ControllerError>;
}

pub fn template_file_name(provider: &str, operation: ImageOperation) -> String {
    format!("{}-podvm-image-{}.yaml", provider, operation.verb())
}

/// Templates read from a directory on disk
#[derive(Debug, Clone)]
pub struct FileTemplateSource {
    dir: PathBuf,
}

impl FileTemplateSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl JobTemplateSource for FileTemplateSource {
    fn load(&self, provider: &str, operation: ImageOperation) -> Result<String, ControllerError> {
        let path = self.dir.join(template_file_name(provider, operation));
        std::fs::read_to_string(&path)
            .map_err(|e| ControllerError::Template(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
pub use in_memory::StaticTemplateSource;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(template_file_name("aws", ImageOperation::Create), "aws-podvm-image-create.yaml");
        assert_eq!(template_file_name("libvirt", ImageOperation::Delete), "libvirt-podvm-image-delete.yaml");
    }

    #[test]
    fn test_missing_file_is_a_template_error() {
        let source = FileTemplateSource::new("/nonexistent/podvm");
        let err = source.load("aws", ImageOperation::Create).unwrap_err();
        assert!(matches!(err, ControllerError::Template(_)));
    }
}
