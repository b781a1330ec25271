//! LLM token cost tracking.
//!
//! Every chat completion made by an agent is priced from its token usage and
//! stored in the `api_calls` table, labelled with the context that made it
//! (e.g. `search_agent`, `script_writer`).

use crate::db::{format_ts, Database};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Prompts above this many tokens use the large-context tier.
const LARGE_PROMPT_TOKENS: u64 = 200_000;

/// Prices in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    /// Tier used when the prompt exceeds 200k tokens.
    pub large: Option<(f64, f64)>,
}

const FLASH: ModelPricing = ModelPricing {
    input: 0.30,
    output: 2.50,
    large: None,
};

const fn flat(input: f64, output: f64) -> ModelPricing {
    ModelPricing {
        input,
        output,
        large: None,
    }
}

const PRICING: &[(&str, ModelPricing)] = &[
    ("gemini-2.5-flash", FLASH),
    ("gemini-2.5-flash-lite", flat(0.10, 0.40)),
    (
        "gemini-2.5-pro",
        ModelPricing {
            input: 1.25,
            output: 10.00,
            large: Some((2.50, 15.00)),
        },
    ),
    (
        "gpt-4o-mini",
        ModelPricing {
            input: 0.15,
            output: 0.60,
            large: None,
        },
    ),
    (
        "gpt-4o",
        ModelPricing {
            input: 2.50,
            output: 10.00,
            large: None,
        },
    ),
    (
        "gpt-4.1",
        ModelPricing {
            input: 2.00,
            output: 8.00,
            large: None,
        },
    ),
    ("gpt-4.1-mini", flat(0.40, 1.60)),
    ("gpt-4.1-nano", flat(0.10, 0.40)),
];

/// Suffixes naming a cheaper sibling model, never a dated variant.
const SMALLER_TIERS: [&str; 3] = ["mini", "nano", "lite"];

/// `name` is `known` itself or a dated/versioned variant of it.
fn is_variant(name: &str, known: &str) -> bool {
    match name.strip_prefix(known) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|tail| !SMALLER_TIERS.iter().any(|tier| tail.starts_with(tier))),
        None => false,
    }
}

/// Pricing for a model name. Dated or prefixed variants (`models/gpt-4o-2024-08-06`)
/// match the longest known prefix; unknown models are priced as gemini-2.5-flash.
pub fn pricing_for(model: &str) -> ModelPricing {
    let name = model.trim().trim_start_matches("models/");
    PRICING
        .iter()
        .filter(|(known, _)| is_variant(name, known))
        .max_by_key(|(known, _)| known.len())
        .map(|(_, pricing)| *pricing)
        .unwrap_or(FLASH)
}

/// Token counts reported by one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A priced API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub call_id: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub timestamp: DateTime<Utc>,
    pub context: Option<String>,
}

/// Price a call without storing it.
pub fn calculate_cost(model: &str, usage: TokenUsage, context: Option<&str>) -> CostRecord {
    let pricing = pricing_for(model);
    let (input_rate, output_rate) = match pricing.large {
        Some(large) if usage.input_tokens > LARGE_PROMPT_TOKENS => large,
        _ => (pricing.input, pricing.output),
    };

    let input_cost = usage.input_tokens as f64 / 1_000_000.0 * input_rate;
    let output_cost = usage.output_tokens as f64 / 1_000_000.0 * output_rate;

    CostRecord {
        call_id: format!("call_{}", uuid::Uuid::new_v4().simple()),
        model: model.to_string(),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
        timestamp: Utc::now(),
        context: context.map(str::to_string),
    }
}

/// Filters for [`CostTracker::summary`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CostFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub context: Option<String>,
}

/// Aggregated costs; all zero when nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostSummary {
    pub total_input_cost: f64,
    pub total_output_cost: f64,
    pub total_cost: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_calls: u64,
}

/// Records and aggregates API call costs.
pub struct CostTracker {
    db: Arc<Database>,
}

impl CostTracker {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Price and store one call.
    #[instrument(skip(self))]
    pub fn record(&self, model: &str, usage: TokenUsage, context: Option<&str>) -> Result<CostRecord> {
        let record = calculate_cost(model, usage, context);
        self.insert(&record)?;
        debug!(
            "Recorded {} call: {} in / {} out tokens, ${:.6}",
            record.model, record.input_tokens, record.output_tokens, record.total_cost
        );
        Ok(record)
    }

    pub fn insert(&self, record: &CostRecord) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO api_calls
             (call_id, model, input_tokens, output_tokens, total_tokens,
              input_cost, output_cost, total_cost, context, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.call_id,
                record.model,
                record.input_tokens as i64,
                record.output_tokens as i64,
                (record.input_tokens + record.output_tokens) as i64,
                record.input_cost,
                record.output_cost,
                record.total_cost,
                record.context,
                format_ts(record.timestamp),
            ],
        )?;
        Ok(())
    }

    /// Totals over the calls matching `filter`.
    pub fn summary(&self, filter: &CostFilter) -> Result<CostSummary> {
        let mut sql = String::from(
            "SELECT COALESCE(SUM(input_cost), 0.0), COALESCE(SUM(output_cost), 0.0),
                    COALESCE(SUM(total_cost), 0.0), COALESCE(SUM(input_tokens), 0),
                    COALESCE(SUM(output_tokens), 0), COUNT(*)
             FROM api_calls WHERE 1=1",
        );
        let mut values: Vec<Value> = Vec::new();

        if let Some(start) = filter.start {
            sql.push_str(" AND timestamp >= ?");
            values.push(Value::Text(format_ts(start)));
        }
        if let Some(end) = filter.end {
            sql.push_str(" AND timestamp <= ?");
            values.push(Value::Text(format_ts(end)));
        }
        if let Some(model) = &filter.model {
            sql.push_str(" AND model = ?");
            values.push(Value::Text(model.clone()));
        }
        if let Some(context) = &filter.context {
            sql.push_str(" AND context = ?");
            values.push(Value::Text(context.clone()));
        }

        let conn = self.db.conn()?;
        let summary = conn.query_row(&sql, rusqlite::params_from_iter(values), |row| {
            Ok(CostSummary {
                total_input_cost: row.get(0)?,
                total_output_cost: row.get(1)?,
                total_cost: row.get(2)?,
                total_input_tokens: row.get::<_, i64>(3)? as u64,
                total_output_tokens: row.get::<_, i64>(4)? as u64,
                total_calls: row.get::<_, i64>(5)? as u64,
            })
        })?;
        Ok(summary)
    }

    /// Total cost per context label, most expensive first.
    pub fn by_context(&self) -> Result<Vec<(String, f64, u64)>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT COALESCE(context, 'unknown'), SUM(total_cost), COUNT(*)
             FROM api_calls GROUP BY 1 ORDER BY 2 DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn test_pricing_lookup() {
        assert_eq!(pricing_for("gpt-4o-mini-2024-07-18").input, 0.15);
        assert_eq!(pricing_for("gpt-4o").input, 2.50);
        assert_eq!(pricing_for("models/gemini-2.5-pro").output, 10.00);
        assert_eq!(pricing_for("some-new-model"), FLASH);
    }

    #[test]
    fn test_smaller_siblings_are_not_priced_as_the_big_model() {
        assert_eq!(pricing_for("gpt-4.1-mini").input, 0.40);
        assert_eq!(pricing_for("gpt-4.1-mini-2025-04-14").output, 1.60);
        assert_eq!(pricing_for("gpt-4.1-nano").input, 0.10);
        assert_eq!(pricing_for("gpt-4.1-2025-04-14").input, 2.00);
        assert_eq!(pricing_for("gemini-2.5-flash-lite").output, 0.40);
        assert_eq!(pricing_for("gpt-4o-mini").input, 0.15);
        assert_eq!(pricing_for("gpt-4.10"), FLASH);
        assert_eq!(pricing_for("gpt-4o-nano"), FLASH);
    }

    #[test]
    fn test_flash_cost() {
        let record = calculate_cost("gemini-2.5-flash", usage(1_000_000, 1_000_000), None);
        assert!(approx(record.input_cost, 0.30));
        assert!(approx(record.output_cost, 2.50));
        assert!(approx(record.total_cost, 2.80));
        assert!(record.call_id.starts_with("call_"));
    }

    #[test]
    fn test_pro_large_prompt_tier() {
        let small = calculate_cost("gemini-2.5-pro", usage(200_000, 1_000_000), None);
        assert!(approx(small.input_cost, 0.25));
        assert!(approx(small.output_cost, 10.00));

        let large = calculate_cost("gemini-2.5-pro", usage(400_000, 1_000_000), None);
        assert!(approx(large.input_cost, 1.00));
        assert!(approx(large.output_cost, 15.00));
    }

    #[test]
    fn test_summary_filters_and_zero_fill() {
        let tracker = CostTracker::new(Arc::new(Database::open_in_memory().unwrap()));

        let empty = tracker.summary(&CostFilter::default()).unwrap();
        assert_eq!(empty, CostSummary::default());

        tracker
            .record("gpt-4o-mini", usage(1000, 500), Some("search_agent"))
            .unwrap();
        tracker
            .record("gpt-4.1", usage(2000, 1000), Some("script_writer"))
            .unwrap();

        let all = tracker.summary(&CostFilter::default()).unwrap();
        assert_eq!(all.total_calls, 2);
        assert_eq!(all.total_input_tokens, 3000);

        let scripts = tracker
            .summary(&CostFilter {
                context: Some("script_writer".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(scripts.total_calls, 1);
        assert!(approx(scripts.total_cost, 0.004 + 0.008));

        let future = tracker
            .summary(&CostFilter {
                start: Some(Utc::now() + chrono::Duration::hours(1)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(future.total_calls, 0);

        let contexts = tracker.by_context().unwrap();
        assert_eq!(contexts[0].0, "script_writer");
    }
}
