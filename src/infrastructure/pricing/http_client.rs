use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::PricingApiSettings;
use crate::domain::error::UpstreamError;
use crate::domain::ports::pricing_client::{CompetitivePricingClient, SubmissionAck};
use crate::domain::values::snapshot::CompetitorSnapshot;

/// Competitive-pricing and listings API over HTTPS.
///
/// Requests are spaced at least `min_request_interval` apart across all
/// callers; retries are left to the scheduler.
pub struct HttpPricingClient {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
    seller_id: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    #[serde(default)]
    data: Vec<PricingEntry>,
}

#[derive(Debug, Deserialize)]
struct PricingEntry {
    #[serde(default, alias = "SellerSKU")]
    sku: Option<String>,
    #[serde(default)]
    offers: Vec<Offer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Offer {
    #[serde(default)]
    seller_id: Option<String>,
    #[serde(default)]
    is_buy_box_winner: bool,
    #[serde(default)]
    listing_price: Option<Money>,
}

#[derive(Debug, Clone, Deserialize)]
struct Money {
    amount: Decimal,
}

impl HttpPricingClient {
    pub fn new(settings: &PricingApiSettings) -> Self {
        Self {
            client: Client::builder()
                .user_agent("repricer/0.1")
                .timeout(settings.request_timeout)
                .build()
                .unwrap_or_default(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            access_token: settings.access_token.clone(),
            seller_id: settings.seller_id.clone(),
            min_interval: settings.min_request_interval,
            last_request: Mutex::new(None),
        }
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "throttling pricing API request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn request(&self, method: Method, url: String) -> Result<RequestBuilder, UpstreamError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| UpstreamError::Permanent("no pricing API access token configured".into()))?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header("x-amz-access-token", token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, UpstreamError> {
        self.throttle().await;
        let resp = request.send().await.map_err(classify_transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[async_trait]
impl CompetitivePricingClient for HttpPricingClient {
    async fn connect(&self, _marketplace: &str) -> Result<(), UpstreamError> {
        match self.access_token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(()),
            _ => Err(UpstreamError::Permanent("no pricing API access token configured".into())),
        }
    }

    async fn fetch_snapshot(&self, marketplace: &str, sku: &str) -> Result<CompetitorSnapshot, UpstreamError> {
        let request = self
            .request(Method::GET, format!("{}/products/pricing/v0/competitivePrice", self.endpoint))?
            .query(&[("MarketplaceId", marketplace), ("Skus", sku), ("ItemType", "Sku")]);
        let resp = self.send(request).await?;
        let payload: PricingResponse = resp
            .json()
            .await
            .map_err(|e| UpstreamError::Permanent(format!("malformed pricing payload: {e}")))?;

        let offers = payload
            .data
            .into_iter()
            .find(|entry| entry.sku.as_deref().map_or(true, |s| s == sku))
            .map(|entry| entry.offers)
            .unwrap_or_default();
        Ok(snapshot_from_offers(&offers, &self.seller_id, Utc::now()))
    }

    async fn submit_price(
        &self,
        marketplace: &str,
        sku: &str,
        new_price: Decimal,
        new_business_price: Option<Decimal>,
    ) -> Result<SubmissionAck, UpstreamError> {
        let url = format!(
            "{}/listings/2021-08-01/items/{}/{}/price",
            self.endpoint, self.seller_id, sku
        );
        let body = price_patch_body(marketplace, new_price, new_business_price);
        let resp = self.send(self.request(Method::PATCH, url)?.json(&body)).await?;
        let payload = resp.json::<serde_json::Value>().await.unwrap_or_else(|_| json!({ "status": "submitted" }));
        let reference = payload
            .get("submissionId")
            .and_then(|v| v.as_str())
            .map(String::from);
        Ok(SubmissionAck { reference, payload })
    }
}

fn price_patch_body(marketplace: &str, price: Decimal, business_price: Option<Decimal>) -> serde_json::Value {
    let mut body = json!({
        "MarketplaceId": marketplace,
        "PriceType": if business_price.is_some() { "B2B" } else { "B2C" },
        "StandardPrice": price.to_f64(),
    });
    if let Some(bp) = business_price {
        body["BusinessPrice"] = json!(bp.to_f64());
    }
    body
}

/// Offers carrying our seller id are ours; the rest are competitors.
fn snapshot_from_offers(offers: &[Offer], own_seller_id: &str, now: DateTime<Utc>) -> CompetitorSnapshot {
    let is_ours = |o: &Offer| o.seller_id.as_deref() == Some(own_seller_id);
    let price = |o: &Offer| o.listing_price.as_ref().map(|m| m.amount).filter(|p| *p > Decimal::ZERO);

    let is_buy_box_winner = offers.iter().any(|o| is_ours(o) && o.is_buy_box_winner);
    let lowest_competitor_price = offers.iter().filter(|o| !is_ours(*o)).filter_map(price).min();
    let buy_box_price = if is_buy_box_winner {
        None
    } else {
        offers.iter().find(|o| o.is_buy_box_winner).and_then(price)
    };

    CompetitorSnapshot {
        lowest_competitor_price,
        is_buy_box_winner,
        buy_box_price,
        snapshot_time: now,
    }
}

fn classify_status(status: StatusCode, body: &str) -> UpstreamError {
    let message = format!("{status}: {}", body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS {
        UpstreamError::RateLimited(message)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        UpstreamError::Transient(message)
    } else {
        UpstreamError::Permanent(message)
    }
}

fn classify_transport(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        UpstreamError::Transient(e.to_string())
    } else {
        UpstreamError::Permanent(e.to_string())
    }
}
