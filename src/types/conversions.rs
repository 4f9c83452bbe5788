use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

// Amounts stay integral in the engine; these helpers are for display only.
pub fn to_human_units(value: U256, decimals: u32) -> Result<Decimal, ConversionError> {
    let mut amount = Decimal::from_str(&value.to_string())
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;
    amount
        .set_scale(decimals)
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;
    Ok(amount.normalize())
}

/// USD value of a native-currency amount, rounded to cents.
pub fn to_usd(value: U256, decimals: u32, usd_rate: f64) -> Result<Decimal, ConversionError> {
    let amount = to_human_units(value, decimals)?;
    let rate = Decimal::from_f64(usd_rate).ok_or(ConversionError::Overflow)?;
    amount
        .checked_mul(rate)
        .map(|v| v.round_dp(2))
        .ok_or(ConversionError::Overflow)
}

// EIP-55 form used for keys shown to users
pub fn checksum(addr: &Address) -> String {
    to_checksum(addr, None)
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    let trimmed = s.trim();
    if trimmed.len() != 42 || !trimmed.starts_with("0x") {
        return Err(ConversionError::InvalidAddress(trimmed.to_string()));
    }
    Address::from_str(trimmed).map_err(|_| ConversionError::InvalidAddress(trimmed.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_human_units() {
        let one_and_half_eth = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(
            to_human_units(one_and_half_eth, 18).unwrap(),
            Decimal::from_str("1.5").unwrap()
        );
        assert_eq!(to_human_units(U256::zero(), 18).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_to_usd_rounds_to_cents() {
        let half_eth = U256::from(500_000_000_000_000_000u128);
        assert_eq!(
            to_usd(half_eth, 18, 2500.123).unwrap(),
            Decimal::from_str("1250.06").unwrap()
        );
    }

    #[test]
    fn test_string_to_address() {
        let lower = string_to_address("0x82a9c823332518c32a0c0edc050ef00934cf04d4").unwrap();
        let mixed = string_to_address(" 0x82A9c823332518c32a0c0eDC050Ef00934Cf04D4 ").unwrap();
        assert_eq!(lower, mixed);
        assert_eq!(checksum(&lower), "0x82A9c823332518c32a0c0eDC050Ef00934Cf04D4");

        assert!(string_to_address("0x1234").is_err());
        assert!(string_to_address("not-an-address").is_err());
    }
}
