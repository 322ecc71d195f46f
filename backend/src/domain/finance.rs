//! Technician and company shares of a closed order.
//!
//! The split is a pure function of the money fields, the bonus flags, the
//! technician's roles and the specialty-rate table. Shares are rounded to
//! two decimal places with banker's rounding.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::{CloseFlags, Money, Role, RoleSet};

/// Net profit from which the standard split becomes 50/50.
pub fn high_net_threshold() -> Decimal {
    Decimal::from(7000)
}

fn bonus_rate() -> Decimal {
    Decimal::new(1, 1)
}

fn hundred() -> Decimal {
    Decimal::ONE_HUNDRED
}

/// Percentage override for technicians of one specialty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialtyRate {
    pub specialty_name: String,
    pub technician_percentage: Decimal,
    pub company_percentage: Decimal,
    /// Marks a seeded row; lookups treat it like any other.
    pub is_default: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SpecialtyRate {
    /// Whether the percentages add up to exactly one hundred.
    pub fn is_balanced(&self) -> bool {
        self.technician_percentage + self.company_percentage == hundred()
    }
}

/// Case-insensitive lookup over live specialty rates.
#[derive(Debug, Clone, Default)]
pub struct SpecialtyRateTable {
    rates: Vec<(String, Decimal, Decimal)>,
}

impl SpecialtyRateTable {
    /// Keep rows that are live and balanced.
    pub fn new(rates: impl IntoIterator<Item = SpecialtyRate>) -> Self {
        let rates = rates
            .into_iter()
            .filter(|rate| rate.deleted_at.is_none() && rate.is_balanced())
            .map(|rate| {
                (
                    rate.specialty_name.trim().to_lowercase(),
                    rate.technician_percentage,
                    rate.company_percentage,
                )
            })
            .filter(|(name, _, _)| !name.is_empty())
            .collect();
        Self { rates }
    }

    /// Percentages for an equipment category.
    ///
    /// An exact (case-insensitive) name wins; otherwise the longest specialty
    /// name contained in the category is used.
    ///
    /// # Examples
    /// ```
    /// use dispatch_backend::domain::finance::{SpecialtyRate, SpecialtyRateTable};
    /// use rust_decimal::Decimal;
    ///
    /// let table = SpecialtyRateTable::new([SpecialtyRate {
    ///     specialty_name: "Electric".into(),
    ///     technician_percentage: Decimal::from(70),
    ///     company_percentage: Decimal::from(30),
    ///     is_default: false,
    ///     deleted_at: None,
    /// }]);
    /// assert!(table.lookup("electric stove").is_some());
    /// assert!(table.lookup("fridge").is_none());
    /// ```
    pub fn lookup(&self, category: &str) -> Option<(Decimal, Decimal)> {
        let category = category.trim().to_lowercase();
        if category.is_empty() {
            return None;
        }
        if let Some((_, tech, company)) = self.rates.iter().find(|(name, _, _)| *name == category)
        {
            return Some((*tech, *company));
        }
        self.rates
            .iter()
            .filter(|(name, _, _)| category.contains(name.as_str()))
            .max_by_key(|(name, _, _)| name.chars().count())
            .map(|(_, tech, company)| (*tech, *company))
    }
}

/// Everything the split depends on.
#[derive(Debug, Clone)]
pub struct SplitInput<'a> {
    pub money: Money,
    pub flags: CloseFlags,
    pub technician_roles: &'a RoleSet,
    pub equipment_category: &'a str,
    pub rates: &'a SpecialtyRateTable,
}

/// Source of the base percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseRule {
    SpecialtyRate,
    PrivilegedRole,
    HighNet,
    Standard,
}

/// Computed split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub technician_share: Decimal,
    pub company_share: Decimal,
    pub base_rule: BaseRule,
    /// Bonuses exceeded the company share and it was clamped to zero.
    pub company_clamped: bool,
}

/// Split rejected by the calculator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FinanceError {
    #[error("net amount {net} is negative")]
    NegativeNet { net: Decimal },
}

fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

fn base_split(input: &SplitInput<'_>, net: Decimal) -> (Decimal, Decimal, BaseRule) {
    if let Some((tech, company)) = input.rates.lookup(input.equipment_category) {
        return (tech / hundred(), company / hundred(), BaseRule::SpecialtyRate);
    }
    let half = Decimal::new(5, 1);
    if input.technician_roles.contains(Role::SeniorMaster)
        || input.technician_roles.contains(Role::Admin)
    {
        return (half, half, BaseRule::PrivilegedRole);
    }
    if net >= high_net_threshold() {
        return (half, half, BaseRule::HighNet);
    }
    (Decimal::new(4, 1), Decimal::new(6, 1), BaseRule::Standard)
}

/// Compute the technician and company shares.
///
/// # Examples
/// ```
/// use dispatch_backend::domain::finance::{split, SpecialtyRateTable, SplitInput};
/// use dispatch_backend::domain::{CloseFlags, Money, Role, RoleSet};
/// use rust_decimal::Decimal;
///
/// let roles = RoleSet::new([Role::Master]);
/// let result = split(&SplitInput {
///     money: Money {
///         total_amount: Decimal::from(10_000),
///         materials_cost: Decimal::from(2_000),
///     },
///     flags: CloseFlags::default(),
///     technician_roles: &roles,
///     equipment_category: "Washing machine",
///     rates: &SpecialtyRateTable::default(),
/// })
/// .expect("non-negative net");
/// assert_eq!(result.technician_share, Decimal::from(4_000));
/// assert_eq!(result.company_share, Decimal::from(4_000));
/// ```
pub fn split(input: &SplitInput<'_>) -> Result<Split, FinanceError> {
    let net = input.money.net();
    if net < Decimal::ZERO {
        return Err(FinanceError::NegativeNet { net });
    }

    let (base_tech, base_company, base_rule) = base_split(input, net);
    let bonus_count = u32::from(input.flags.has_review) + u32::from(input.flags.out_of_city);
    let bonus = net * bonus_rate() * Decimal::from(bonus_count);

    let mut technician_share = net * base_tech + bonus;
    let mut company_share = net * base_company - bonus;
    let mut company_clamped = false;
    if company_share < Decimal::ZERO {
        company_share = Decimal::ZERO;
        technician_share = net;
        company_clamped = true;
    }

    Ok(Split {
        technician_share: round(technician_share),
        company_share: round(company_share),
        base_rule,
        company_clamped,
    })
}
