strong_type!(
    /// Identifies a leaf speed reporter (one per task executor).
    ReporterId,
    u64
);
strong_type!(
    /// Identifies a node aggregator; stable for the lifetime of a job.
    NodeId,
    u32
);
strong_type!(
    /// Identifies an ingestion stream owned by a data source.
    StreamId,
    u32
);
strong_type!(
    /// Identifies one processing cycle (batch) reported by the scheduler.
    CycleId,
    u64
);
strong_type!(
    /// Identifies a running job; one coordinator exists per job.
    JobId,
    u32
);
