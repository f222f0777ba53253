//! The public ENSEK client.
//!
//! # Design
//! `EnsekClient` is a thin facade over a `Dispatcher`. Every read operation
//! goes through one atomic `call(operation, args)`: resolve the template,
//! build the request, execute it under the retry policy, parse the body.
//! The named methods below (`get_account`, `get_meter_points`, ...) only
//! assemble `Args` for that call.
//!
//! Reading creation and attribute update carry dedicated bodies, so they
//! are written out by hand instead of going through argument partitioning.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, Transport, UreqTransport};
use crate::operation::{ArgValue, Args, Operation, PathTemplate};
use crate::retry::RetryPolicy;
use crate::types::{AccountAttribute, AttributeUpdate, MeterReading, ReadingSubmission, SignUpsPage};

const READINGS: PathTemplate = PathTemplate::new("/Accounts/{account_id}/Readings");
const ATTRIBUTES: PathTemplate = PathTemplate::new("/accounts/{account_id}/Attributes");

/// Blocking client for the ENSEK API. Cheap to share across threads.
#[derive(Debug)]
pub struct EnsekClient {
    dispatcher: Dispatcher,
}

impl EnsekClient {
    /// Validates the retry pair and builds a client on the `ureq` transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let retry = config.retry_policy()?;
        let transport = Arc::new(UreqTransport::new(config.timeout));
        Ok(Self::with_transport(&config.api_url, &config.api_key, retry, transport))
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_transport(
        api_url: &str,
        api_key: &str,
        retry: RetryPolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(api_url, api_key, retry, transport),
        }
    }

    pub fn base_url(&self) -> &str {
        self.dispatcher.base_url()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.dispatcher.retry_policy()
    }

    /// Resolves `operation` against `args` and returns the JSON body.
    pub fn call(&self, operation: Operation, args: &Args) -> Result<Value> {
        let resolved = operation.resolve(args)?;
        let request = self
            .dispatcher
            .build_request(HttpMethod::Get, &resolved.path, None, &resolved.query);
        self.send_json(&request)
    }

    /// Same as `call`, with the operation given by its snake_case name.
    pub fn call_by_name(&self, operation: &str, args: &Args) -> Result<Value> {
        self.call(Operation::from_name(operation)?, args)
    }

    /// Same as `call`, deserializing the body into `T`.
    pub fn call_json<T: DeserializeOwned>(&self, operation: Operation, args: &Args) -> Result<T> {
        let value = self.call(operation, args)?;
        serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    fn send_json(&self, request: &HttpRequest) -> Result<Value> {
        let body = self.send_text(request)?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiError::Deserialization(format!("{}: {e}", request.url)))
    }

    fn send_text(&self, request: &HttpRequest) -> Result<String> {
        Ok(self.dispatcher.execute_with_retry(request)?.body)
    }

    pub fn get_account(&self, account_id: impl Into<ArgValue>) -> Result<Value> {
        self.call(Operation::GetAccount, &Args::new().with("account_id", account_id))
    }

    pub fn get_account_settings(&self, account_id: impl Into<ArgValue>) -> Result<Value> {
        self.call(
            Operation::GetAccountSettings,
            &Args::new().with("account_id", account_id),
        )
    }

    /// One page of completed sign-ups, starting after the `after` account id.
    pub fn get_completed_signups(&self, after: Option<u64>) -> Result<Value> {
        let mut args = Args::new();
        if let Some(after) = after {
            args.insert("after", after);
        }
        self.call(Operation::GetCompletedSignups, &args)
    }

    pub fn get_meter_points(&self, account_id: impl Into<ArgValue>) -> Result<Value> {
        self.call(Operation::GetMeterPoints, &Args::new().with("account_id", account_id))
    }

    pub fn get_meter_point_readings(&self, meter_point_id: impl Into<ArgValue>) -> Result<Value> {
        self.call(
            Operation::GetMeterPointReadings,
            &Args::new().with("meter_point_id", meter_point_id),
        )
    }

    pub fn get_region_id_for_postcode(&self, postcode: &str) -> Result<Value> {
        self.call(
            Operation::GetRegionIdForPostcode,
            &Args::new().with("postcode", postcode),
        )
    }

    pub fn get_gas_utility(&self, mprn: &str) -> Result<Value> {
        self.call(Operation::GetGasUtility, &Args::new().with("mprn", mprn))
    }

    pub fn get_electricity_utility(&self, mpan_core_id: &str) -> Result<Value> {
        self.call(
            Operation::GetElectricityUtility,
            &Args::new().with("mpan_core_id", mpan_core_id),
        )
    }

    /// `include_history` is only sent when given.
    pub fn get_account_tariffs(
        &self,
        account_id: impl Into<ArgValue>,
        include_history: Option<bool>,
    ) -> Result<Value> {
        let mut args = Args::new().with("account_id", account_id);
        if let Some(include_history) = include_history {
            args.insert("include_history", include_history);
        }
        self.call(Operation::GetAccountTariffs, &args)
    }

    pub fn get_account_for_meter_point(&self, meter_point_id: impl Into<ArgValue>) -> Result<Value> {
        self.call(
            Operation::GetAccountForMeterPoint,
            &Args::new().with("meter_point_id", meter_point_id),
        )
    }

    pub fn get_live_balances(&self, account_id: impl Into<ArgValue>) -> Result<Value> {
        self.call(Operation::GetLiveBalances, &Args::new().with("account_id", account_id))
    }

    pub fn get_live_balances_detailed(&self, account_id: impl Into<ArgValue>) -> Result<Value> {
        self.call(
            Operation::GetLiveBalancesDetailed,
            &Args::new().with("account_id", account_id),
        )
    }

    pub fn get_addresses_at_postcode(&self, postcode: &str) -> Result<Value> {
        self.call(
            Operation::GetAddressesAtPostcode,
            &Args::new().with("postcode", postcode),
        )
    }

    pub fn get_account_attributes(&self, account_id: impl Into<ArgValue>) -> Result<Value> {
        self.call(
            Operation::GetAccountAttributes,
            &Args::new().with("account_id", account_id),
        )
    }

    /// Submits one register reading. The body is a one-element array.
    pub fn create_meter_reading(
        &self,
        account_id: impl Into<ArgValue>,
        reading: &MeterReading,
    ) -> Result<Value> {
        let path = READINGS
            .resolve("create_meter_reading", &Args::new().with("account_id", account_id))?
            .path;
        let body = serde_json::to_string(&[ReadingSubmission::from(reading)])
            .map_err(|e| ApiError::Serialization(e.to_string()))?;
        let request = self
            .dispatcher
            .build_request(HttpMethod::Post, &path, Some(body), &[]);
        self.send_json(&request)
    }

    /// Replaces the given attributes on the account. The API answers with
    /// plain text, returned as is.
    pub fn update_account_attributes(
        &self,
        account_id: impl Into<ArgValue>,
        attributes: Vec<AccountAttribute>,
    ) -> Result<String> {
        let path = ATTRIBUTES
            .resolve("update_account_attributes", &Args::new().with("account_id", account_id))?
            .path;
        let update = AttributeUpdate {
            updated_attributes: attributes,
            deleted_attributes: Vec::new(),
        };
        let body = serde_json::to_string(&update).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let request = self
            .dispatcher
            .build_request(HttpMethod::Put, &path, Some(body), &[]);
        self.send_text(&request)
    }

    /// Every account id with a completed sign-up.
    ///
    /// Pages are requested with `after` set to the largest id of the
    /// previous page until a page comes back empty.
    pub fn get_all_account_ids(&self) -> Result<BTreeSet<u64>> {
        let mut ids = BTreeSet::new();
        let mut after: Option<u64> = None;
        loop {
            let mut args = Args::new();
            if let Some(after) = after {
                args.insert("after", after);
            }
            let page: SignUpsPage = self.call_json(Operation::GetCompletedSignups, &args)?;
            let Some(max) = page.results.iter().map(|s| s.account_id).max() else {
                break;
            };
            ids.extend(page.results.iter().map(|s| s.account_id));
            if after.is_some_and(|prev| max <= prev) {
                warn!(cursor = max, "sign-up cursor did not advance, stopping");
                break;
            }
            after = Some(max);
        }
        Ok(ids)
    }
}
