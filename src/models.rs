/// Direction of money movement for a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    Inflow,
    Outflow,
}

impl Flow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inflow => "INFLOW",
            Self::Outflow => "OUTFLOW",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "INFLOW" | "INCOME" | "IN" => Some(Self::Inflow),
            "OUTFLOW" | "EXPENSE" | "OUT" => Some(Self::Outflow),
            _ => None,
        }
    }
}

/// What kind of rows an uploaded file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Origins,
    Banks,
    Categories,
    Transactions,
}

impl RecordKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Origins => "origins",
            Self::Banks => "banks",
            Self::Categories => "categories",
            Self::Transactions => "transactions",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "origins" => Some(Self::Origins),
            "banks" => Some(Self::Banks),
            "categories" => Some(Self::Categories),
            "transactions" => Some(Self::Transactions),
            _ => None,
        }
    }
}

/// Composite natural key for a category dimension row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryKey {
    pub flow: Flow,
    pub major_category: String,
    pub category: String,
    pub sub_category: String,
}

impl CategoryKey {
    pub fn unknown(flow: Flow) -> Self {
        Self {
            flow,
            major_category: "Unknown".to_string(),
            category: "Unknown".to_string(),
            sub_category: String::new(),
        }
    }
}

/// Normalized-but-not-yet-persisted form produced by the normalizer.
#[derive(Debug, Clone)]
pub struct DraftTransaction {
    pub date: String,
    pub flow: Flow,
    pub amount: f64,
    pub description: String,
    pub origin: String,
    pub bank: String,
    pub category_key: Option<CategoryKey>,
    pub external_id: Option<String>,
    pub month_name: String,
    pub year: i32,
    pub categorization_confidence: f64,
    pub is_machine_categorized: bool,
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordError {
    pub record_index: usize,
    pub message: String,
}

/// One asynchronous import unit of work, tracked in the job registry.
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub id: String,
    pub source_label: String,
    pub record_kind: RecordKind,
    pub total_records: usize,
    pub processed_records: usize,
    pub failed_records: usize,
    pub status: JobStatus,
    pub error_report: Vec<RecordError>,
    pub fatal_error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl ImportJob {
    pub fn percentage(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.processed_records as f64 / self.total_records as f64
        }
    }
}
