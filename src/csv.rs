use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::Amount;
use crate::ledger::Customer;
use crate::model::{Command, CustomerId, RewardCategory, RewardId};

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open csv file: {0}")]
    Open(csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized command type '{command}'")]
    UnrecognizedType { line: usize, command: String },

    #[error("line {line}: {command} missing {field}")]
    MissingField {
        line: usize,
        command: String,
        field: &'static str,
    },

    #[error("line {line}: unknown reward category '{category}'")]
    UnknownCategory { line: usize, category: String },

    #[error("line {line}: amount {value} is not a finite value in range")]
    InvalidAmount { line: usize, value: f64 },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InputRow {
    r#type: String,
    customer: Option<CustomerId>,
    reward: Option<RewardId>,
    amount: Option<f64>,
    store: Option<String>,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    description: Option<String>,
    cost: Option<u64>,
    category: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    customer: CustomerId,
    name: &'a str,
    tier: &'static str,
    points: u64,
    spend: String,
}

/// Read ledger commands from a csv file
pub fn read_commands(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Command, CsvError>>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(CsvError::Open)?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            parse_row(line, row)
        }))
}

fn parse_row(line: usize, row: InputRow) -> Result<Command, CsvError> {
    let command = row.r#type.to_ascii_lowercase();
    let missing = |field| CsvError::MissingField {
        line,
        command: command.clone(),
        field,
    };

    match command.as_str() {
        "customer" => Ok(Command::CreateCustomer {
            name: non_empty(row.name).ok_or_else(|| missing("name"))?,
            email: row.email.unwrap_or_default(),
            phone: row.phone.unwrap_or_default(),
        }),
        "reward" => {
            let category = non_empty(row.category).ok_or_else(|| missing("category"))?;
            let category = category
                .parse::<RewardCategory>()
                .map_err(|category| CsvError::UnknownCategory { line, category })?;
            Ok(Command::CreateReward {
                name: non_empty(row.name).ok_or_else(|| missing("name"))?,
                description: row.description.unwrap_or_default(),
                points_cost: row.cost.ok_or_else(|| missing("cost"))?,
                category,
            })
        }
        "purchase" => {
            let value = row.amount.ok_or_else(|| missing("amount"))?;
            Ok(Command::Purchase {
                customer: row.customer.ok_or_else(|| missing("customer"))?,
                amount: Amount::try_from_float(value)
                    .ok_or(CsvError::InvalidAmount { line, value })?,
                store_location: row.store.unwrap_or_default(),
            })
        }
        "redeem" => Ok(Command::Redeem {
            customer: row.customer.ok_or_else(|| missing("customer"))?,
            reward: row.reward.ok_or_else(|| missing("reward"))?,
        }),
        "delete_reward" => Ok(Command::DeleteReward {
            reward: row.reward.ok_or_else(|| missing("reward"))?,
        }),
        _ => Err(CsvError::UnrecognizedType {
            line,
            command: row.r#type,
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Write customers as csv to `writer`
pub fn write_customers<'a, W: io::Write>(
    writer: W,
    customers: impl IntoIterator<Item = &'a Customer>,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    for customer in customers {
        writer.serialize(OutputRow {
            customer: customer.id(),
            name: customer.name(),
            tier: customer.tier().as_str(),
            points: customer.points_balance(),
            spend: customer.cumulative_spend().to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}
