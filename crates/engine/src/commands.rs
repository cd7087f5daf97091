//! Inbound chat commands and their parsing. Malformed input is rejected
//! here, before anything touches a wallet or the network.

use perp_pilot_core::types::{Direction, OrderIntent};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Bind (or rebind) the session: derive the wallet, report the address.
    Start,
    CreateAccount,
    GetPositions,
    GetOrders,
    GetBalance,
    ApproveSpending,
    /// Target price in USD.
    SetAlert(Decimal),
    /// Magnitude in fxUSD.
    AddCollateral(Decimal),
    WithdrawCollateral(Decimal),
    PlaceOrder(OrderIntent),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command {0}")]
    Unknown(String),

    #[error("missing {0}")]
    MissingArgument(&'static str),

    #[error("{0:?} is not a valid {1}")]
    InvalidNumber(String, &'static str),

    #[error("direction must be 1 (long) or 2 (short), got {0:?}")]
    InvalidDirection(String),
}

/// Parses a chat message into a command. Returns `Ok(None)` for plain text
/// that is not a command at all.
///
/// # Errors
/// Returns a [`CommandError`] describing what was wrong with the arguments.
pub fn parse(text: &str) -> Result<Option<ChatCommand>, CommandError> {
    let mut words = text.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    if !head.starts_with('/') {
        return Ok(None);
    }
    // Telegram may suffix the addressed bot: "/start@perp_pilot_bot".
    let command = head.split('@').next().unwrap_or(head);

    let parsed = match command {
        "/start" | "/get_started" => ChatCommand::Start,
        "/create_account" => ChatCommand::CreateAccount,
        "/get_positions" => ChatCommand::GetPositions,
        "/get_orders" => ChatCommand::GetOrders,
        "/get_balance" => ChatCommand::GetBalance,
        "/approve" => ChatCommand::ApproveSpending,
        "/set_alert" => ChatCommand::SetAlert(positive_decimal(words.next(), "target price")?),
        "/add_collateral" => {
            ChatCommand::AddCollateral(positive_decimal(words.next(), "collateral amount")?)
        }
        "/withdraw_collateral" => {
            ChatCommand::WithdrawCollateral(positive_decimal(words.next(), "collateral amount")?)
        }
        "/place_order" => {
            let direction_raw = words.next().ok_or(CommandError::MissingArgument(
                "direction (1 = long, 2 = short)",
            ))?;
            let direction = direction_raw
                .parse::<u32>()
                .ok()
                .and_then(Direction::from_code)
                .ok_or_else(|| CommandError::InvalidDirection(direction_raw.to_string()))?;

            let market_raw = words.next().ok_or(CommandError::MissingArgument("market code"))?;
            let market_code = market_raw
                .parse::<u32>()
                .map_err(|_| CommandError::InvalidNumber(market_raw.to_string(), "market code"))?;

            let notional_size = positive_decimal(words.next(), "notional size")?;

            ChatCommand::PlaceOrder(OrderIntent {
                direction,
                market_code,
                notional_size,
            })
        }
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Some(parsed))
}

fn positive_decimal(
    word: Option<&str>,
    what: &'static str,
) -> Result<Decimal, CommandError> {
    let raw = word.ok_or(CommandError::MissingArgument(what))?;
    let value: Decimal = raw
        .parse()
        .map_err(|_| CommandError::InvalidNumber(raw.to_string(), what))?;
    if value <= Decimal::ZERO {
        return Err(CommandError::InvalidNumber(raw.to_string(), what));
    }
    Ok(value)
}
