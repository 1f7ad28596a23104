use serde::{Deserialize, Serialize};

/// One table of user interactions that feeds the profile, with its base weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSourceSpec {
    pub table: String,
    pub timestamp_column: String,
    pub base_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct InteractionRow {
    pub paper_id: i64,
    /// Whole days elapsed since the interaction.
    pub age_days: f64,
}
