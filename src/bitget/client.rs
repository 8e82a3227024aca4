// =============================================================================
// Bitget REST API Client — HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: the secret key and passphrase are never logged or serialized.
// Every private request carries ACCESS-KEY, ACCESS-SIGN, ACCESS-TIMESTAMP and
// ACCESS-PASSPHRASE headers; the signature is the base64 HMAC-SHA256 of
// `timestamp + METHOD + path + ("?" + query)? + body`.
//
// Retry policy: connection errors and read timeouts are retried up to three
// attempts with exponential backoff plus jitter. HTTP 429/500/502/503/504 get
// a single extra attempt after one second. Venue business errors (code other
// than "00000") are never retried.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use rand::Rng;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::bitget::models::{
    ClosedPosition, HistoryData, OrderAck, PendingPlansData, PlanOrderInfo, PlanType, RawAccount,
    RawContract, RawTicker, Ticker, TpslRequest, VenuePosition,
};
use crate::bitget::precision::InstrumentSpec;
use crate::bitget::VenueApi;
use crate::error::{TransportKind, VenueError, VenueResult};
use crate::types::quote_coin;

type HmacSha256 = Hmac<Sha256>;

const BASE_URL: &str = "https://api.bitget.com";
/// Product class for every request; the engine trades USDT-perps only.
const PRODUCT_TYPE: &str = "USDT-FUTURES";
/// Venue-level success code.
const SUCCESS_CODE: &str = "00000";
/// Per-request network timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Total attempts allowed for transport-error retries.
const MAX_TRANSPORT_ATTEMPTS: u32 = 3;
/// Base delay for the exponential backoff, in seconds.
const RETRY_BASE_DELAY_SECS: f64 = 1.0;
/// Statuses that get one extra attempt with backoff factor 1.
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Build the signature prehash `timestamp + METHOD + path (+ "?" + query) + body`.
/// An empty query contributes nothing, not a trailing `?`.
pub(crate) fn prehash(timestamp: i64, method: &str, path: &str, query: &str, body: &str) -> String {
    let mut out = format!("{timestamp}{}{path}", method.to_uppercase());
    if !query.is_empty() {
        out.push('?');
        out.push_str(query);
    }
    out.push_str(body);
    out
}

/// Base64-encoded HMAC-SHA256 signature over the request prehash.
pub(crate) fn sign_payload(
    secret: &str,
    timestamp: i64,
    method: &str,
    path: &str,
    query: &str,
    body: &str,
) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(prehash(timestamp, method, path, query, body).as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Standard Bitget response envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// Bitget REST client with HMAC-SHA256 request signing and an
/// instrument-precision cache.
pub struct BitgetClient {
    api_key: String,
    secret: String,
    passphrase: String,
    base_url: String,
    http: reqwest::Client,
    specs: RwLock<HashMap<String, InstrumentSpec>>,
}

impl BitgetClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BitgetClient`.
    ///
    /// # Arguments
    /// * `api_key`    — Bitget API key (sent as a header).
    /// * `secret`     — secret key used exclusively for HMAC signing.
    /// * `passphrase` — API passphrase header value.
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");

        debug!("BitgetClient initialised (base_url={BASE_URL})");

        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: passphrase.into(),
            base_url: BASE_URL.to_string(),
            http,
            specs: RwLock::new(HashMap::new()),
        }
    }

    /// Current UNIX timestamp in milliseconds.
    fn timestamp_ms() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as i64
    }

    /// Cached precision rules, or the per-symbol defaults when the contract
    /// was never fetched.
    fn cached_spec(&self, symbol: &str) -> InstrumentSpec {
        self.specs
            .read()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| InstrumentSpec::fallback(symbol))
    }

    // -------------------------------------------------------------------------
    // Request core
    // -------------------------------------------------------------------------

    /// Send one signed request and return the envelope's `data` field.
    async fn request_value(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> VenueResult<Value> {
        let query_string = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        // The body text is signed, so the exact same string must be sent.
        let body_text = body.map(Value::to_string).unwrap_or_default();

        let timestamp = Self::timestamp_ms();
        let signature = sign_payload(
            &self.secret,
            timestamp,
            method.as_str(),
            path,
            &query_string,
            &body_text,
        );

        let mut url = format!("{}{path}", self.base_url);
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }

        let mut status_retry_used = false;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let mut req = self
                .http
                .request(method.clone(), url.as_str())
                .header("ACCESS-KEY", &self.api_key)
                .header("ACCESS-SIGN", &signature)
                .header("ACCESS-TIMESTAMP", timestamp.to_string())
                .header("ACCESS-PASSPHRASE", &self.passphrase)
                .header("Content-Type", "application/json");
            if body.is_some() {
                req = req.body(body_text.clone());
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if RETRYABLE_STATUS.contains(&status) && !status_retry_used {
                        status_retry_used = true;
                        warn!(path, status, "retryable HTTP status — one extra attempt");
                        tokio::time::sleep(Duration::from_secs_f64(RETRY_BASE_DELAY_SECS)).await;
                        continue;
                    }

                    let text = resp.text().await.map_err(|e| VenueError::Malformed(
                        format!("failed to read response body: {e}"),
                    ))?;
                    let envelope: Envelope = serde_json::from_str(&text).map_err(|_| {
                        let preview: String = text.chars().take(200).collect();
                        VenueError::Malformed(format!("non-JSON response (HTTP {status}): {preview}"))
                    })?;

                    if envelope.code == SUCCESS_CODE {
                        return Ok(envelope.data);
                    }
                    return Err(VenueError::Business {
                        code: envelope.code,
                        message: envelope.msg,
                    });
                }
                Err(e) => {
                    let kind = if e.is_timeout() {
                        TransportKind::Timeout
                    } else if e.is_connect() {
                        TransportKind::Connect
                    } else {
                        TransportKind::Other
                    };

                    if kind.is_retryable() && attempt < MAX_TRANSPORT_ATTEMPTS {
                        let delay = RETRY_BASE_DELAY_SECS * 2f64.powi(attempt as i32 - 1)
                            + rand::thread_rng().gen_range(0.0..1.0);
                        warn!(
                            path,
                            %kind,
                            attempt,
                            delay_secs = format!("{delay:.2}"),
                            "transport error — retrying"
                        );
                        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                        continue;
                    }
                    return Err(VenueError::Transport {
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Signed request with a typed `data` payload.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> VenueResult<T> {
        let data = self.request_value(method, path, query, body).await?;
        serde_json::from_value(data)
            .map_err(|e| VenueError::Malformed(format!("{path}: {e}")))
    }

    fn order_id_from(ack: OrderAck, path: &str) -> VenueResult<String> {
        ack.order_id
            .ok_or_else(|| VenueError::Malformed(format!("{path}: missing orderId")))
    }
}

#[async_trait::async_trait]
impl VenueApi for BitgetClient {
    #[instrument(skip(self), name = "bitget::list_instruments")]
    async fn list_instruments(&self) -> VenueResult<Vec<InstrumentSpec>> {
        let contracts: Vec<RawContract> = self
            .request(
                Method::GET,
                "/api/v2/mix/market/contracts",
                &[("productType", PRODUCT_TYPE.to_string())],
                None,
            )
            .await?;

        let specs: Vec<InstrumentSpec> = contracts.into_iter().map(RawContract::into_spec).collect();
        {
            let mut cache = self.specs.write();
            for spec in &specs {
                cache.insert(spec.symbol.clone(), spec.clone());
            }
        }
        debug!(count = specs.len(), "instrument specs refreshed");
        Ok(specs)
    }

    #[instrument(skip(self), name = "bitget::instrument")]
    async fn instrument(&self, symbol: &str) -> VenueResult<InstrumentSpec> {
        if let Some(spec) = self.specs.read().get(symbol).cloned() {
            return Ok(spec);
        }

        let contracts: Vec<RawContract> = self
            .request(
                Method::GET,
                "/api/v2/mix/market/contracts",
                &[
                    ("productType", PRODUCT_TYPE.to_string()),
                    ("symbol", symbol.to_string()),
                ],
                None,
            )
            .await?;

        let spec = contracts
            .into_iter()
            .find(|c| c.symbol == symbol)
            .map(RawContract::into_spec)
            .ok_or_else(|| VenueError::NotFound(format!("instrument {symbol}")))?;

        self.specs.write().insert(symbol.to_string(), spec.clone());
        Ok(spec)
    }

    #[instrument(skip(self), name = "bitget::ticker")]
    async fn ticker(&self, symbol: &str) -> VenueResult<Ticker> {
        let tickers: Vec<RawTicker> = self
            .request(
                Method::GET,
                "/api/v2/mix/market/ticker",
                &[
                    ("symbol", symbol.to_string()),
                    ("productType", PRODUCT_TYPE.to_string()),
                ],
                None,
            )
            .await?;

        let ticker = tickers
            .first()
            .ok_or_else(|| VenueError::NotFound(format!("ticker {symbol}")))?
            .normalize()
            .ok_or_else(|| VenueError::Malformed(format!("ticker {symbol}: missing last price")))?;
        debug!(symbol, last = ticker.last, open_utc = ticker.open_utc, "ticker fetched");
        Ok(ticker)
    }

    #[instrument(skip(self), name = "bitget::account_equity")]
    async fn account_equity(&self, margin_coin: &str) -> VenueResult<f64> {
        let accounts: Vec<RawAccount> = self
            .request(
                Method::GET,
                "/api/v2/mix/account/accounts",
                &[("productType", PRODUCT_TYPE.to_string())],
                None,
            )
            .await?;

        match accounts
            .iter()
            .find(|a| a.margin_coin.as_deref() == Some(margin_coin))
        {
            Some(account) => {
                let equity = account.equity();
                debug!(margin_coin, equity, "account equity retrieved");
                Ok(equity)
            }
            None => {
                warn!(margin_coin, "no matching sub-account — returning 0.0");
                Ok(0.0)
            }
        }
    }

    #[instrument(skip(self, client_oid), name = "bitget::place_market_order")]
    async fn place_market_order(
        &self,
        symbol: &str,
        side: &str,
        size: f64,
        reduce_only: bool,
        client_oid: Option<&str>,
    ) -> VenueResult<String> {
        let spec = self.cached_spec(symbol);
        let size = spec.quantize_size(size)?;

        // tradeSide is omitted: the account runs in one-way position mode.
        let mut body = json!({
            "symbol": symbol,
            "productType": PRODUCT_TYPE,
            "marginMode": "crossed",
            "marginCoin": quote_coin(symbol),
            "side": side,
            "orderType": "market",
            "size": format!("{size}"),
            "reduceOnly": if reduce_only { "YES" } else { "NO" },
        });
        if let Some(oid) = client_oid {
            body["clientOid"] = Value::String(oid.to_string());
        }

        debug!(symbol, side, size, reduce_only, "placing market order");

        let ack: OrderAck = self
            .request(Method::POST, "/api/v2/mix/order/place-order", &[], Some(&body))
            .await?;
        Self::order_id_from(ack, "/api/v2/mix/order/place-order")
    }

    #[instrument(skip(self, req), name = "bitget::place_tpsl")]
    async fn place_tpsl(&self, req: &TpslRequest) -> VenueResult<String> {
        let spec = self.cached_spec(&req.symbol);
        let trigger = spec.truncate_price(req.trigger_price);
        if trigger <= 0.0 {
            return Err(VenueError::InvalidPrice(format!(
                "trigger price {} rounds to zero for {}",
                req.trigger_price, req.symbol
            )));
        }
        // executePrice 0 executes at market once triggered.
        let execute = req
            .execute_price
            .map(|p| spec.truncate_price(p))
            .unwrap_or(0.0);

        let body = json!({
            "symbol": req.symbol,
            "productType": PRODUCT_TYPE,
            "marginCoin": quote_coin(&req.symbol),
            "planType": req.plan.as_str(),
            "triggerType": req.trigger_source.as_str(),
            "triggerPrice": format!("{trigger}"),
            "executePrice": format!("{execute}"),
            "holdSide": req.hold_side.hold_side(),
            "size": format!("{}", req.size),
        });

        debug!(
            symbol = %req.symbol,
            plan = req.plan.as_str(),
            trigger_price = trigger,
            "placing TPSL plan order"
        );

        let ack: OrderAck = self
            .request(
                Method::POST,
                "/api/v2/mix/order/place-tpsl-order",
                &[],
                Some(&body),
            )
            .await?;
        Self::order_id_from(ack, "/api/v2/mix/order/place-tpsl-order")
    }

    #[instrument(skip(self), name = "bitget::modify_tpsl")]
    async fn modify_tpsl(
        &self,
        order_id: &str,
        symbol: &str,
        new_trigger_price: f64,
        new_execute_price: Option<f64>,
        new_size: Option<f64>,
    ) -> VenueResult<String> {
        let spec = self.cached_spec(symbol);
        let trigger = spec.truncate_price(new_trigger_price);

        let mut body = json!({
            "orderId": order_id,
            "symbol": symbol,
            "productType": PRODUCT_TYPE,
            "marginCoin": quote_coin(symbol),
            "triggerPrice": format!("{trigger}"),
        });
        if let Some(exec) = new_execute_price {
            body["executePrice"] = Value::String(format!("{}", spec.truncate_price(exec)));
        }
        if let Some(size) = new_size {
            body["size"] = Value::String(format!("{}", spec.quantize_size(size)?));
        }

        debug!(symbol, order_id, trigger_price = trigger, "modifying TPSL plan order");

        let ack: OrderAck = self
            .request(
                Method::POST,
                "/api/v2/mix/order/modify-tpsl-order",
                &[],
                Some(&body),
            )
            .await?;
        Self::order_id_from(ack, "/api/v2/mix/order/modify-tpsl-order")
    }

    #[instrument(skip(self), name = "bitget::cancel_tpsl")]
    async fn cancel_tpsl(&self, order_id: &str, symbol: &str, plan: PlanType) -> VenueResult<()> {
        let body = json!({
            "orderId": order_id,
            "symbol": symbol,
            "productType": PRODUCT_TYPE,
            "marginCoin": quote_coin(symbol),
            "planType": plan.as_str(),
        });

        debug!(symbol, order_id, plan = plan.as_str(), "cancelling TPSL plan order");

        self.request_value(
            Method::POST,
            "/api/v2/mix/order/cancel-tpsl-order",
            &[],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), name = "bitget::pending_plans")]
    async fn pending_plans(&self, symbol: &str) -> VenueResult<Vec<PlanOrderInfo>> {
        let data: PendingPlansData = self
            .request(
                Method::GET,
                "/api/v2/mix/order/orders-plan-pending",
                &[
                    ("productType", PRODUCT_TYPE.to_string()),
                    ("planType", "profit_loss".to_string()),
                    ("symbol", symbol.to_string()),
                ],
                None,
            )
            .await?;
        Ok(data.entrusted_list.unwrap_or_default())
    }

    #[instrument(skip(self), name = "bitget::positions")]
    async fn positions(&self, symbol: Option<&str>) -> VenueResult<Vec<VenuePosition>> {
        let mut query = vec![("productType", PRODUCT_TYPE.to_string())];
        if let Some(sym) = symbol {
            query.push(("symbol", sym.to_string()));
        }

        let mut positions: Vec<VenuePosition> = self
            .request(Method::GET, "/api/v2/mix/position/all-position", &query, None)
            .await?;
        for pos in &mut positions {
            pos.hold_side = pos.hold_side.to_lowercase();
        }
        Ok(positions)
    }

    #[instrument(skip(self), name = "bitget::history_positions")]
    async fn history_positions(
        &self,
        symbol: Option<&str>,
        limit: u32,
    ) -> VenueResult<Vec<ClosedPosition>> {
        let mut query = vec![("productType", PRODUCT_TYPE.to_string())];
        if let Some(sym) = symbol {
            query.push(("symbol", sym.to_string()));
        }
        query.push(("limit", limit.to_string()));

        let data: HistoryData = self
            .request(
                Method::GET,
                "/api/v2/mix/position/history-position",
                &query,
                None,
            )
            .await?;
        Ok(data.list)
    }
}

impl std::fmt::Debug for BitgetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitgetClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prehash_layout_with_query() {
        let p = prehash(
            1_700_000_000_000,
            "get",
            "/api/v2/mix/market/ticker",
            "symbol=BTCUSDT&productType=USDT-FUTURES",
            "",
        );
        assert_eq!(
            p,
            "1700000000000GET/api/v2/mix/market/ticker?symbol=BTCUSDT&productType=USDT-FUTURES"
        );
    }

    #[test]
    fn prehash_omits_question_mark_without_query() {
        let p = prehash(
            1_700_000_000_000,
            "POST",
            "/api/v2/mix/order/place-order",
            "",
            r#"{"symbol":"BTCUSDT"}"#,
        );
        assert_eq!(
            p,
            r#"1700000000000POST/api/v2/mix/order/place-order{"symbol":"BTCUSDT"}"#
        );
    }

    #[test]
    fn signature_is_deterministic() {
        let a = sign_payload(
            "secret",
            1_700_000_000_000,
            "GET",
            "/api/v2/mix/account/accounts",
            "productType=USDT-FUTURES",
            "",
        );
        let b = sign_payload(
            "secret",
            1_700_000_000_000,
            "GET",
            "/api/v2/mix/account/accounts",
            "productType=USDT-FUTURES",
            "",
        );
        assert_eq!(a, b);
        // HMAC-SHA256 digests are 32 bytes: 44 base64 characters with padding.
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn signature_depends_on_every_component() {
        let base = sign_payload("secret", 1, "GET", "/p", "q=1", "");
        assert_ne!(base, sign_payload("other", 1, "GET", "/p", "q=1", ""));
        assert_ne!(base, sign_payload("secret", 2, "GET", "/p", "q=1", ""));
        assert_ne!(base, sign_payload("secret", 1, "POST", "/p", "q=1", ""));
        assert_ne!(base, sign_payload("secret", 1, "GET", "/p", "q=2", ""));
        assert_ne!(base, sign_payload("secret", 1, "GET", "/p", "q=1", "{}"));
    }

    #[test]
    fn client_debug_redacts_credentials() {
        let client = BitgetClient::new("AK-12345", "SUPERSECRET", "HUSH-PHRASE");
        let dump = format!("{client:?}");
        assert!(!dump.contains("AK-12345"));
        assert!(!dump.contains("SUPERSECRET"));
        assert!(!dump.contains("HUSH-PHRASE"));
        assert!(dump.contains("<redacted>"));
    }
}
