use std::io::Read;

use beacon_core::error::{BeaconError, Result};
use flate2::read::GzDecoder;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Inflates a gzip body. With `force_gzip` unset, the gzip magic bytes decide.
pub fn inflate(body: &[u8], force_gzip: bool) -> Result<Vec<u8>> {
    if !force_gzip && !body.starts_with(&GZIP_MAGIC) {
        return Ok(body.to_vec());
    }
    let mut out = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(|e| BeaconError::Ingest(format!("gzip decode failed: {e}")))?;
    Ok(out)
}

pub fn decode_traces_body(body: &[u8], force_gzip: bool) -> Result<ExportTraceServiceRequest> {
    let raw = inflate(body, force_gzip)?;
    ExportTraceServiceRequest::decode(raw.as_slice())
        .map_err(|e| BeaconError::Ingest(format!("otlp traces decode failed: {e}")))
}

pub fn decode_metrics_body(body: &[u8], force_gzip: bool) -> Result<ExportMetricsServiceRequest> {
    let raw = inflate(body, force_gzip)?;
    ExportMetricsServiceRequest::decode(raw.as_slice())
        .map_err(|e| BeaconError::Ingest(format!("otlp metrics decode failed: {e}")))
}
