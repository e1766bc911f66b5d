#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    metrics::{Counter, Histogram, MeterProvider as _},
    KeyValue,
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics::SdkMeterProvider;
#[cfg(feature = "metrics")]
use prometheus::{Registry, TextEncoder};

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<AnchorageMetrics> = Lazy::new(AnchorageMetrics::init);

#[cfg(feature = "metrics")]
pub struct AnchorageMetrics {
    pub registry: Registry,
    pub queries_total: Counter<u64>,
    pub query_errors_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
    pub transactions_total: Counter<u64>,
    _provider: SdkMeterProvider,
}

#[cfg(feature = "metrics")]
impl AnchorageMetrics {
    pub fn init() -> Self {
        let registry = Registry::new();
        let provider = match opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
        {
            Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
            Err(err) => {
                log::warn!("prometheus exporter unavailable, metrics are not exported: {err}");
                SdkMeterProvider::builder().build()
            }
        };
        let meter = provider.meter("anchorage");

        let queries_total = meter
            .u64_counter("anchorage_queries_total")
            .with_description("Total statements executed")
            .build();

        let query_errors_total = meter
            .u64_counter("anchorage_query_errors_total")
            .with_description("Statements that failed in the driver")
            .build();

        let query_duration = meter
            .f64_histogram("anchorage_query_duration_seconds")
            .with_description("Duration of statements")
            .build();

        let transactions_total = meter
            .u64_counter("anchorage_transactions_total")
            .with_description("Transactions finished, by outcome")
            .build();

        Self {
            registry,
            queries_total,
            query_errors_total,
            query_duration,
            transactions_total,
            _provider: provider,
        }
    }

    pub fn record_query(&self, driver: &'static str, elapsed: std::time::Duration) {
        let labels = [KeyValue::new("driver", driver)];
        self.queries_total.add(1, &labels);
        self.query_duration.record(elapsed.as_secs_f64(), &labels);
    }

    pub fn record_query_error(&self, driver: &'static str) {
        self.query_errors_total
            .add(1, &[KeyValue::new("driver", driver)]);
    }

    /// `outcome` is `commit` or `rollback`
    pub fn record_transaction(&self, outcome: &'static str) {
        self.transactions_total
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }

    /// Prometheus text exposition of everything recorded so far
    pub fn render(&self) -> String {
        match TextEncoder::new().encode_to_string(&self.registry.gather()) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("failed to encode metrics: {err}");
                String::new()
            }
        }
    }
}

/// Spans around statements and transactions
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    /// Statement text is truncated so spans stay small
    const MAX_SQL_IN_SPAN: usize = 256;

    fn truncate(sql: &str) -> &str {
        if sql.len() <= MAX_SQL_IN_SPAN {
            return sql;
        }
        let mut end = MAX_SQL_IN_SPAN;
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        &sql[..end]
    }

    pub fn execute_query_span(driver: &'static str, sql: &str) -> Span {
        info_span!("anchorage.query", db.system = driver, db.statement = truncate(sql))
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("anchorage.connect")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("anchorage.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("anchorage.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("anchorage.transaction.rollback")
    }

}
