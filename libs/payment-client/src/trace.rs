//! Client-side counterpart of `opentelemetry-config`'s `MetadataExtractor`:
//! that one reads W3C trace-context out of inbound gRPC metadata on the
//! server side, this one writes it into outbound metadata before the Payment
//! RPC is dialed, so the payment service's own server-side extractor picks up
//! the same trace.

use opentelemetry::propagation::Injector;
use tonic::metadata::{MetadataKey, MetadataMap};

pub struct MetadataInjector<'a>(pub &'a mut MetadataMap);

impl<'a> Injector for MetadataInjector<'a> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(key) = MetadataKey::from_bytes(key.as_bytes()) {
            if let Ok(value) = value.parse() {
                self.0.insert(key, value);
            }
        }
    }
}

/// Inject the current tracing span's context into outbound gRPC metadata.
pub fn inject_trace_context(metadata: &mut MetadataMap) {
    use opentelemetry::global;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    let context = tracing::Span::current().context();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&context, &mut MetadataInjector(metadata));
    });
}
