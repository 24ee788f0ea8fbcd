//! Prometheus metrics exposition
//!
//! The core crates emit their own `pool_*` and `queue_*` counters through the
//! `metrics` facade; this module installs the recorder that collects them and
//! adds the service-level issuance counter.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
///
/// The handle's `render()` output is served on `GET /metrics`.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record an issued credential with the issuing path as a label.
pub fn record_credential_issued(via: &str) {
    metrics::counter!("credentials_issued_total", "via" => via.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // Without an installed recorder, metrics calls are no-ops
        record_credential_issued("generate");
    }

    /// Build an isolated recorder/handle pair; only one global recorder can
    /// exist per process, so tests must not call `install_recorder`.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn issued_counter_carries_via_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_credential_issued("generate");
        record_credential_issued("refresh");

        let output = handle.render();
        assert!(output.contains("credentials_issued_total"), "got: {output}");
        assert!(output.contains("via=\"generate\""));
        assert!(output.contains("via=\"refresh\""));
    }
}
