use shared::metrics_defs::{MetricDef, MetricType};

pub const FLAG_EVALUATIONS: MetricDef = MetricDef {
    name: "flag.evaluations",
    metric_type: MetricType::Counter,
    description: "Number of flag evaluations. Tagged with kind, outcome (ok, error, timeout, panic, invalid_value).",
};

pub const FLAG_RESOLUTION_DURATION: MetricDef = MetricDef {
    name: "flag.resolution.duration",
    metric_type: MetricType::Histogram,
    description: "Time to resolve every configured flag for one request, in seconds",
};

pub const UPSTREAM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "upstream.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time until the upstream returned response headers, in seconds. Tagged with status.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    FLAG_EVALUATIONS,
    FLAG_RESOLUTION_DURATION,
    UPSTREAM_REQUEST_DURATION,
];
