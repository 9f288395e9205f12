//! On-the-fly conversion of source-framework checkpoints into graphs.

use super::{GraphHandle, GraphProvider};
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// A complete conversion result: config plus every compiled graph.
pub struct ExportedModel {
    pub config: ModelConfig,
    pub graphs: Vec<GraphHandle>,
}

/// The external conversion collaborator.
///
/// Consumes a source-framework checkpoint reference and emits compiled
/// graph byte streams plus the tensor-name mapping embedded in the config.
/// Failures are reported as one structured error with a readable cause
/// chain; the provider wraps them without retrying.
pub trait GraphExporter: Send + Sync {
    fn export(
        &self,
        model_id: &str,
        revision: &str,
    ) -> std::result::Result<ExportedModel, Box<dyn std::error::Error + Send + Sync>>;
}

/// A [`GraphProvider`] that converts the source checkpoint on every load.
///
/// The exporter's output is validated for completeness before anything is
/// handed downstream, so a failed or partial conversion never becomes
/// visible to later load calls.
pub struct ExportingProvider {
    exporter: Arc<dyn GraphExporter>,
}

impl ExportingProvider {
    pub fn new(exporter: Arc<dyn GraphExporter>) -> Self {
        Self { exporter }
    }
}

impl GraphProvider for ExportingProvider {
    fn load(&self, model_id: &str, revision: &str) -> Result<(ModelConfig, Vec<GraphHandle>)> {
        let exported = self
            .exporter
            .export(model_id, revision)
            .map_err(|source| Error::Conversion {
                model_id: model_id.into(),
                source,
            })?;
        exported.config.validate()?;

        // an exporter that produced some graphs but not all is still a
        // failed conversion, not a loadable bundle
        let expected = exported.config.architecture.expected_roles();
        let mut handles = Vec::with_capacity(expected.len());
        for &role in expected {
            let graph = exported
                .graphs
                .iter()
                .find(|g| g.role == role)
                .ok_or_else(|| Error::Conversion {
                    model_id: model_id.into(),
                    source: format!("exported bundle is missing the {role} graph").into(),
                })?;
            handles.push(graph.clone());
        }

        info!(model_id, revision, graphs = handles.len(), "exported graph bundle");
        Ok((exported.config, handles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Architecture, GraphRole, ModelConfig, Precision, Task, TensorNaming};

    fn encoder_only_config() -> ModelConfig {
        ModelConfig {
            architecture: Architecture::EncoderOnly,
            task: Task::QuestionAnswering,
            precision: Precision::F32,
            naming: TensorNaming::default(),
            decoder: None,
            diffusion: None,
        }
    }

    struct OkExporter;

    impl GraphExporter for OkExporter {
        fn export(
            &self,
            _model_id: &str,
            _revision: &str,
        ) -> std::result::Result<ExportedModel, Box<dyn std::error::Error + Send + Sync>> {
            Ok(ExportedModel {
                config: encoder_only_config(),
                graphs: vec![GraphHandle {
                    role: GraphRole::Encoder,
                    bytes: vec![1, 2, 3],
                }],
            })
        }
    }

    struct FailingExporter;

    impl GraphExporter for FailingExporter {
        fn export(
            &self,
            _model_id: &str,
            _revision: &str,
        ) -> std::result::Result<ExportedModel, Box<dyn std::error::Error + Send + Sync>> {
            Err("unsupported opset".into())
        }
    }

    struct PartialExporter;

    impl GraphExporter for PartialExporter {
        fn export(
            &self,
            _model_id: &str,
            _revision: &str,
        ) -> std::result::Result<ExportedModel, Box<dyn std::error::Error + Send + Sync>> {
            let mut config = encoder_only_config();
            config.architecture = Architecture::Seq2Seq;
            config.decoder = Some(crate::config::DecoderConfig {
                num_layers: 1,
                vocab_size: 4,
                eos_token_id: 1,
                decoder_start_token_id: 0,
            });
            // only one of the three graphs a seq2seq model decomposes into
            Ok(ExportedModel {
                config,
                graphs: vec![GraphHandle {
                    role: GraphRole::Encoder,
                    bytes: vec![1],
                }],
            })
        }
    }

    #[test]
    fn test_successful_export_loads() {
        let provider = ExportingProvider::new(Arc::new(OkExporter));
        let (config, handles) = provider.load("acme/model", "main").unwrap();
        assert_eq!(config.architecture, Architecture::EncoderOnly);
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].role, GraphRole::Encoder);
    }

    #[test]
    fn test_exporter_failure_becomes_conversion_error() {
        let provider = ExportingProvider::new(Arc::new(FailingExporter));
        let err = provider.load("acme/model", "main").unwrap_err();
        match err {
            Error::Conversion { model_id, source } => {
                assert_eq!(model_id, "acme/model");
                assert!(source.to_string().contains("unsupported opset"));
            }
            other => panic!("expected Conversion, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_export_is_conversion_error() {
        let provider = ExportingProvider::new(Arc::new(PartialExporter));
        assert!(matches!(
            provider.load("acme/model", "main"),
            Err(Error::Conversion { .. })
        ));
    }
}
