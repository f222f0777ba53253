//! Endpoint resolution: the operation table, path templates and argument
//! partitioning.
//!
//! # Design
//! Every read operation of the API is a variant of the closed `Operation`
//! enum, bound to a static `PathTemplate`. Resolving an operation against a
//! set of `Args` is a pure function: arguments whose name appears as a
//! `{placeholder}` in the template are substituted into the path, every
//! other argument becomes a query parameter under its camelCase wire name.
//! The split is purely syntactic, so an argument the template does not
//! mention is forwarded rather than rejected.
//!
//! The two write operations (reading creation and attribute update) carry
//! dedicated bodies and live in `client`; they only borrow `PathTemplate`
//! for their path.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{ApiError, Result};

/// Everything but RFC 3986 unreserved characters, so a substituted value
/// can sit in a path segment or a query value without changing either.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A single call argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Str(s) => f.write_str(s),
            ArgValue::Int(n) => write!(f, "{n}"),
            ArgValue::Uint(n) => write!(f, "{n}"),
            ArgValue::Float(x) => write!(f, "{x}"),
            ArgValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Str(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Str(value)
    }
}

impl From<&String> for ArgValue {
    fn from(value: &String) -> Self {
        ArgValue::Str(value.clone())
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        ArgValue::Int(i64::from(value))
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        ArgValue::Uint(u64::from(value))
    }
}

impl From<u64> for ArgValue {
    fn from(value: u64) -> Self {
        ArgValue::Uint(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Float(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

/// Named call arguments, in the order they were supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<(String, ArgValue)>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name`, replacing an earlier value under the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A path with `{name}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTemplate(&'static str);

/// Outcome of resolving a template: the concrete path plus the arguments
/// left over as query parameters, already renamed to their wire names.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub path: String,
    pub query: Vec<(String, ArgValue)>,
}

impl PathTemplate {
    pub const fn new(template: &'static str) -> Self {
        Self(template)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut rest = self.0;
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    names.push(&after[..close]);
                    rest = &after[close + 1..];
                }
                None => break,
            }
        }
        names
    }

    /// Substitutes path arguments (percent-encoded) and partitions the rest
    /// into query parameters. `operation` only labels a `MissingArgument`
    /// error.
    pub fn resolve(&self, operation: &str, args: &Args) -> Result<Resolved> {
        let placeholders = self.placeholders();
        if let Some(missing) = placeholders.iter().find(|p| args.get(p).is_none()) {
            return Err(ApiError::MissingArgument {
                operation: operation.to_string(),
                argument: missing.to_string(),
            });
        }

        let mut path = self.0.to_string();
        let mut query = Vec::new();
        for (name, value) in args.iter() {
            if placeholders.iter().any(|p| *p == name) {
                let encoded = utf8_percent_encode(&value.to_string(), COMPONENT).to_string();
                path = path.replace(&format!("{{{name}}}"), &encoded);
            } else {
                tracing::debug!(operation, argument = name, "sending argument as query parameter");
                query.push((to_camel_case(name), value.clone()));
            }
        }

        Ok(Resolved { path, query })
    }
}

/// Read operations dispatched through the generic resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetAccount,
    GetAccountSettings,
    GetCompletedSignups,
    GetMeterPoints,
    GetMeterPointReadings,
    GetRegionIdForPostcode,
    GetGasUtility,
    GetElectricityUtility,
    GetAccountTariffs,
    GetAccountForMeterPoint,
    GetLiveBalances,
    GetLiveBalancesDetailed,
    GetAddressesAtPostcode,
    GetAccountAttributes,
}

impl Operation {
    pub const ALL: [Operation; 14] = [
        Operation::GetAccount,
        Operation::GetAccountSettings,
        Operation::GetCompletedSignups,
        Operation::GetMeterPoints,
        Operation::GetMeterPointReadings,
        Operation::GetRegionIdForPostcode,
        Operation::GetGasUtility,
        Operation::GetElectricityUtility,
        Operation::GetAccountTariffs,
        Operation::GetAccountForMeterPoint,
        Operation::GetLiveBalances,
        Operation::GetLiveBalancesDetailed,
        Operation::GetAddressesAtPostcode,
        Operation::GetAccountAttributes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetAccount => "get_account",
            Operation::GetAccountSettings => "get_account_settings",
            Operation::GetCompletedSignups => "get_completed_signups",
            Operation::GetMeterPoints => "get_meter_points",
            Operation::GetMeterPointReadings => "get_meter_point_readings",
            Operation::GetRegionIdForPostcode => "get_region_id_for_postcode",
            Operation::GetGasUtility => "get_gas_utility",
            Operation::GetElectricityUtility => "get_electricity_utility",
            Operation::GetAccountTariffs => "get_account_tariffs",
            Operation::GetAccountForMeterPoint => "get_account_for_meter_point",
            Operation::GetLiveBalances => "get_live_balances",
            Operation::GetLiveBalancesDetailed => "get_live_balances_detailed",
            Operation::GetAddressesAtPostcode => "get_addresses_at_postcode",
            Operation::GetAccountAttributes => "get_account_attributes",
        }
    }

    pub fn template(&self) -> PathTemplate {
        PathTemplate::new(match self {
            Operation::GetAccount => "/accounts/{account_id}",
            Operation::GetAccountSettings => "/accounts/{account_id}/AccountSettings",
            Operation::GetCompletedSignups => "/SignUps/Completed",
            Operation::GetMeterPoints => "/Accounts/{account_id}/MeterPoints",
            Operation::GetMeterPointReadings => "/MeterPoints/{meter_point_id}/Readings",
            Operation::GetRegionIdForPostcode => "/Regions/{postcode}",
            Operation::GetGasUtility => "/UtilitiesLookups/Gas/{mprn}",
            Operation::GetElectricityUtility => "/UtilitiesLookups/Elec/{mpan_core_id}",
            Operation::GetAccountTariffs => "/Accounts/{account_id}/Tariffs",
            Operation::GetAccountForMeterPoint => "/Accounts/Lookups/MeterPoints/{meter_point_id}",
            Operation::GetLiveBalances => "/Accounts/{account_id}/LiveBalances",
            Operation::GetLiveBalancesDetailed => "/Accounts/{account_id}/LiveBalancesWithDetail",
            Operation::GetAddressesAtPostcode => "/PostcodeLookups?postcode={postcode}",
            Operation::GetAccountAttributes => "/accounts/{account_id}/Attributes",
        })
    }

    /// Looks an operation up by its snake_case name.
    pub fn from_name(name: &str) -> Result<Operation> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| ApiError::UnknownOperation(name.to_string()))
    }

    pub fn resolve(&self, args: &Args) -> Result<Resolved> {
        self.template().resolve(self.name(), args)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        Operation::from_name(s)
    }
}

/// Resolves an operation given by name.
pub fn resolve(operation_name: &str, args: &Args) -> Result<Resolved> {
    Operation::from_name(operation_name)?.resolve(args)
}

/// `include_history` -> `includeHistory`. Hyphens and spaces separate words
/// too; the first word is lowercased.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if matches!(c, '_' | '-' | ' ') {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
