use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use trolley_client::ClientConfig;
use trolley_core::{ids::*, CoreError, NewItem, Quantity};
use trolley_engine::{config::DEFAULT_MAX_BATCH_SIZE, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "trolley", version, about = "Shared shopping lists")]
pub struct Cli {
    /// SQLite database file.
    #[arg(long, env = "TROLLEY_DB", default_value = "trolley.db", global = true)]
    pub db: String,

    /// Identity of the list owner making the request.
    #[arg(long, env = "TROLLEY_OWNER", global = true)]
    pub owner: Option<OwnerId>,

    #[arg(long, env = "TROLLEY_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, env = "TROLLEY_MAX_QUANTITY", default_value_t = Quantity::DEFAULT_MAX, global = true)]
    pub max_quantity: f64,

    #[arg(long, env = "TROLLEY_MAX_BATCH", default_value_t = DEFAULT_MAX_BATCH_SIZE, global = true)]
    pub max_batch_size: usize,

    #[arg(long = "poll-ms", env = "TROLLEY_POLL_MS", default_value_t = 5_000, global = true)]
    pub poll_ms: u64,

    #[arg(long = "timeout-ms", env = "TROLLEY_TIMEOUT_MS", default_value_t = 10_000, global = true)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_quantity: self.max_quantity,
            max_batch_size: self.max_batch_size,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            poll_interval: Duration::from_millis(self.poll_ms),
            request_timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a list, optionally with items given as INGREDIENT:QUANTITY:UNIT.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long = "item")]
        items: Vec<ItemSpec>,
    },
    /// Add one item to an existing list.
    Add {
        #[arg(long)]
        list: ListId,
        item: ItemSpec,
    },
    /// Mark an item as bought.
    Check {
        #[arg(long)]
        list: ListId,
        #[arg(long)]
        item: ItemId,
    },
    Uncheck {
        #[arg(long)]
        list: ListId,
        #[arg(long)]
        item: ItemId,
    },
    /// Check every remaining item in one batch.
    CheckAll {
        #[arg(long)]
        list: ListId,
    },
    /// Print a list with its items and completion figures.
    Show {
        #[arg(long)]
        list: ListId,
    },
    /// Print the owner's lists.
    Lists,
    Complete {
        #[arg(long)]
        list: ListId,
    },
    /// Poll a list and print its completion figures whenever they change.
    Watch {
        #[arg(long)]
        list: ListId,
    },
}

/// `INGREDIENT:QUANTITY:UNIT`, where INGREDIENT is an id or `new`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSpec(pub NewItem);

impl FromStr for ItemSpec {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(ingredient), Some(quantity), Some(unit)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(CoreError::InvalidData(format!(
                "'{s}' is not INGREDIENT:QUANTITY:UNIT"
            )));
        };
        let ingredient_id = match ingredient.trim() {
            "new" => IngredientId::new(),
            other => other.parse()?,
        };
        let quantity = quantity
            .trim()
            .parse::<f64>()
            .map_err(|e| CoreError::InvalidData(format!("quantity '{quantity}': {e}")))?;
        Ok(Self(NewItem::new(ingredient_id, quantity, unit.trim())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn item_spec_accepts_new_ingredients() {
        let spec: ItemSpec = "new:2.5:kg".parse().unwrap();
        assert_eq!(spec.0.quantity, 2.5);
        assert_eq!(spec.0.unit, "kg");
    }

    #[test]
    fn item_spec_keeps_given_ingredient() {
        let id = IngredientId::new();
        let spec: ItemSpec = format!("{id}:3:piece").parse().unwrap();
        assert_eq!(spec.0.ingredient_id, id);
    }

    #[test]
    fn malformed_item_spec_is_rejected() {
        assert!("flour:2".parse::<ItemSpec>().is_err());
        assert!("new:lots:g".parse::<ItemSpec>().is_err());
        assert!("not-a-uuid:1:g".parse::<ItemSpec>().is_err());
    }

    #[test]
    fn env_style_flags_feed_both_configs() {
        let cli = Cli::try_parse_from([
            "trolley",
            "--poll-ms",
            "250",
            "--max-batch-size",
            "10",
            "lists",
        ])
        .unwrap();
        assert_eq!(cli.client_config().poll_interval, Duration::from_millis(250));
        assert_eq!(cli.engine_config().max_batch_size, 10);
    }
}
