// SPDX-License-Identifier: Apache-2.0 OR MIT
#![cfg_attr(not(feature = "telemetry"), allow(dead_code))]

#[cfg(feature = "telemetry")]
mod otel {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::OnceLock;
    use std::time::Duration;

    use opentelemetry::global;
    use opentelemetry::metrics::{Counter, Histogram};
    use opentelemetry::trace::SpanKind;
    use opentelemetry::{trace::Tracer, KeyValue};

    const METER_NAME: &str = "templater_engine";
    const TRACER_NAME: &str = "templater_engine";

    static ENABLED: AtomicBool = AtomicBool::new(false);
    static HANDLES: OnceLock<Handles> = OnceLock::new();

    struct Handles {
        tracer: opentelemetry::global::BoxedTracer,
        compile_hist: Histogram<f64>,
        execute_hist: Histogram<f64>,
        compile_counter: Counter<u64>,
        execute_counter: Counter<u64>,
        function_counter: Counter<u64>,
    }

    impl Handles {
        fn new() -> Self {
            let meter = global::meter(METER_NAME);
            let compile_hist = meter
                .f64_histogram("templater.compile.duration_ms")
                .with_description("Compile duration in milliseconds")
                .init();
            let execute_hist = meter
                .f64_histogram("templater.execute.duration_ms")
                .with_description("Execute duration in milliseconds")
                .init();
            let compile_counter = meter
                .u64_counter("templater.compile.count")
                .with_description("Number of template compilations")
                .init();
            let execute_counter = meter
                .u64_counter("templater.execute.count")
                .with_description("Number of template executions")
                .init();
            let function_counter = meter
                .u64_counter("templater.function.count")
                .with_description("Number of template function calls")
                .init();
            Self {
                tracer: global::tracer(TRACER_NAME),
                compile_hist,
                execute_hist,
                compile_counter,
                execute_counter,
                function_counter,
            }
        }
    }

    fn handles() -> &'static Handles {
        HANDLES.get_or_init(Handles::new)
    }

    pub fn enable() {
        ENABLED.store(true, Ordering::Relaxed);
    }

    pub fn disable() {
        ENABLED.store(false, Ordering::Relaxed);
    }

    fn enabled() -> bool {
        ENABLED.load(Ordering::Relaxed)
    }

    fn record(
        phase: &'static str,
        template: &str,
        template_len: usize,
        duration: Duration,
        success: bool,
    ) {
        if !enabled() {
            return;
        }
        let hs = handles();
        let duration_ms = duration.as_secs_f64() * 1_000.0;
        let length = i64::try_from(template_len).unwrap_or(i64::MAX);
        let attrs = [
            KeyValue::new("template.name", template.to_string()),
            KeyValue::new("template.length", length),
            KeyValue::new("success", success),
        ];
        let (counter, hist) = match phase {
            "compile" => (&hs.compile_counter, &hs.compile_hist),
            _ => (&hs.execute_counter, &hs.execute_hist),
        };
        counter.add(1, &attrs);
        hist.record(duration_ms, &attrs);
        let mut span = hs
            .tracer
            .span_builder(format!("Template::{phase}"))
            .with_kind(SpanKind::Internal)
            .start(&hs.tracer);
        span.set_attribute(KeyValue::new("template.name", template.to_string()));
        span.set_attribute(KeyValue::new("template.length", length));
        span.set_attribute(KeyValue::new("duration_ms", duration_ms));
        span.set_attribute(KeyValue::new("success", success));
        span.end();
    }

    pub fn record_compile(template: &str, template_len: usize, duration: Duration, success: bool) {
        record("compile", template, template_len, duration, success);
    }

    pub fn record_execute(template: &str, template_len: usize, duration: Duration, success: bool) {
        record("execute", template, template_len, duration, success);
    }

    pub fn record_function_call(name: &str, success: bool) {
        if !enabled() {
            return;
        }
        let attrs = [
            KeyValue::new("function.name", name.to_string()),
            KeyValue::new("function.success", success),
        ];
        handles().function_counter.add(1, &attrs);
    }
}

#[cfg(not(feature = "telemetry"))]
mod otel {
    use std::time::Duration;

    pub fn enable() {}
    pub fn disable() {}
    pub fn record_compile(
        _template: &str,
        _template_len: usize,
        _duration: Duration,
        _success: bool,
    ) {
    }
    pub fn record_execute(
        _template: &str,
        _template_len: usize,
        _duration: Duration,
        _success: bool,
    ) {
    }

    pub fn record_function_call(_name: &str, _success: bool) {}
}

pub use otel::{disable, enable, record_compile, record_execute, record_function_call};
