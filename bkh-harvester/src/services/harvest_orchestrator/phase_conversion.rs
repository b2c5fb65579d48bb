//! DRAINING: queue conversions for the next pass

use super::HarvestOrchestrator;
use crate::models::ConversionRequestOutcome;

impl HarvestOrchestrator {
    /// Ask the service to convert up to `conversions_per_run` available books
    ///
    /// Failures are reported in the outcome; records already created this
    /// pass are untouched.
    pub(super) async fn request_conversions(&self) -> ConversionRequestOutcome {
        let limit = self.config.conversions_per_run;
        if limit == 0 {
            tracing::debug!("Conversion requests disabled");
            return ConversionRequestOutcome::NothingRequested;
        }

        let available = match self.conversion.list_available().await {
            Ok(available) => available,
            Err(e) => {
                tracing::error!(error = %e, "Could not list books available for conversion");
                return ConversionRequestOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };
        if available.is_empty() {
            tracing::info!("No books available for conversion");
            return ConversionRequestOutcome::NothingRequested;
        }

        let barcodes: Vec<String> = available.into_iter().take(limit).collect();
        match self.conversion.request_conversion(&barcodes).await {
            Ok(()) => {
                tracing::info!(count = barcodes.len(), "Conversion requested");
                ConversionRequestOutcome::Requested { barcodes }
            }
            Err(e) => {
                tracing::error!(error = %e, count = barcodes.len(), "Conversion request failed");
                ConversionRequestOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
