use indexmap::IndexMap;

use crate::settings::EventConfig;

/// Memebase on Base mainnet
pub const MEMEBASE_ADDRESS: &str = "0x82A9c823332518c32a0c0eDC050Ef00934Cf04D4";

pub const HEARTED: &str =
    "event Hearted(address indexed hearter, uint256 indexed memeNonce, uint256 amount)";
pub const COLLECTED: &str =
    "event Collected(address indexed hearter, address indexed memeToken, uint256 allocation)";
pub const SUMMONED: &str =
    "event Summoned(address indexed summoner, uint256 indexed memeNonce, uint256 amount)";
pub const UNLEASHED: &str = "event Unleashed(address indexed unleasher, address indexed memeToken, uint256 indexed lpTokenId, uint256 liquidity, uint256 nativeAmountForLP)";
// No caller argument: whoever sent the purge transaction is the actor.
pub const PURGED: &str = "event Purged(address indexed memeToken, uint256 amount)";

fn entry(
    name: &str,
    signature: &str,
    actor_field: Option<&str>,
    amount_field: &str,
    token_field: Option<&str>,
) -> EventConfig {
    EventConfig {
        name: name.to_string(),
        signature: signature.to_string(),
        actor_field: actor_field.map(str::to_string),
        amount_field: amount_field.to_string(),
        token_field: token_field.map(str::to_string),
    }
}

/// The five contract events, keyed by their menu number.
pub fn default_event_table() -> IndexMap<String, EventConfig> {
    let mut table = IndexMap::new();
    table.insert(
        "1".to_string(),
        entry("Hearted", HEARTED, Some("hearter"), "amount", None),
    );
    table.insert(
        "2".to_string(),
        entry(
            "Collected",
            COLLECTED,
            Some("hearter"),
            "allocation",
            Some("memeToken"),
        ),
    );
    table.insert(
        "3".to_string(),
        entry("Summoned", SUMMONED, Some("summoner"), "amount", None),
    );
    table.insert(
        "4".to_string(),
        entry(
            "Unleashed",
            UNLEASHED,
            Some("unleasher"),
            "liquidity",
            Some("memeToken"),
        ),
    );
    table.insert(
        "5".to_string(),
        entry("Purged", PURGED, None, "amount", Some("memeToken")),
    );
    table
}
