use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use serde::Deserialize;
use log::debug;

use crate::error::FetchError;
use crate::models::Quote;
use crate::services::PriceSource;

const ESTIMATE_URL: &str = "https://fundgz.1234567.com.cn/js";
const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const REFERER_URL: &str = "https://fund.eastmoney.com/";

// Estimate times are published in China Standard Time.
const CST_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Deserialize)]
struct EstimatePayload {
    #[serde(default)]
    fundcode: String,
    #[serde(default)]
    name: Option<String>,
    gsz: String,
    gszzl: String,
    #[serde(default)]
    gztime: Option<String>,
}

// Intraday estimates from the public Eastmoney JSONP feed.
pub struct EastmoneyPriceSource {
    client: reqwest::Client,
    base_url: String,
}

impl EastmoneyPriceSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_base_url(ESTIMATE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(REFERER, HeaderValue::from_static(REFERER_URL));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, code: &str) -> String {
        format!("{}/{}.js", self.base_url, urlencoding::encode(code))
    }
}

#[async_trait]
impl PriceSource for EastmoneyPriceSource {
    async fn fetch(&self, code: &str) -> Result<Quote, FetchError> {
        let url = self.url_for(code);
        debug!("Fetching estimate for {} from {}", code, url);

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(code.to_string()));
        }
        let body = response.error_for_status()?.text().await?;

        parse_estimate(code, &body)
    }
}

// Unwraps `jsonpgz({...});`. An empty callback means the fund has no estimate.
pub fn parse_estimate(code: &str, body: &str) -> Result<Quote, FetchError> {
    let start = body.find('(');
    let end = body.rfind(')');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => body[start + 1..end].trim(),
        _ => return Err(FetchError::InvalidResponse(format!("not a JSONP body for fund {}", code))),
    };

    if json.is_empty() {
        return Err(FetchError::NotFound(code.to_string()));
    }

    let payload: EstimatePayload = serde_json::from_str(json)
        .map_err(|e| FetchError::InvalidResponse(format!("fund {}: {}", code, e)))?;

    let price: f64 = payload.gsz.trim().parse()
        .map_err(|_| FetchError::InvalidResponse(format!("fund {}: bad price '{}'", code, payload.gsz)))?;
    let change_rate: f64 = payload.gszzl.trim().parse()
        .map_err(|_| FetchError::InvalidResponse(format!("fund {}: bad change rate '{}'", code, payload.gszzl)))?;

    if !payload.fundcode.is_empty() && payload.fundcode != code {
        return Err(FetchError::InvalidResponse(format!(
            "asked for fund {}, got {}",
            code, payload.fundcode
        )));
    }

    let as_of = payload
        .gztime
        .as_deref()
        .and_then(parse_estimate_time)
        .unwrap_or_else(Utc::now);

    Ok(Quote {
        code: code.to_string(),
        name: payload.name.filter(|name| !name.is_empty()),
        price,
        change_rate,
        as_of,
    })
}

fn parse_estimate_time(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M").ok()?;
    let offset = FixedOffset::east_opt(CST_OFFSET_SECS)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|time| time.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy)]
struct Walk {
    open: f64,
    price: f64,
}

// Random-walk prices for running without network access.
pub struct SimulatedPriceSource {
    walks: Mutex<HashMap<String, Walk>>,
    max_step: f64,
}

impl Default for SimulatedPriceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPriceSource {
    pub fn new() -> Self {
        Self::with_max_step(0.01)
    }

    // `max_step` bounds each move as a fraction of the current price.
    pub fn with_max_step(max_step: f64) -> Self {
        Self {
            walks: Mutex::new(HashMap::new()),
            max_step: max_step.abs(),
        }
    }

    fn step(&self, code: &str) -> Result<Walk, FetchError> {
        let mut rng = rand::thread_rng();
        let mut walks = self.walks.lock()
            .map_err(|_| FetchError::InvalidResponse("simulator lock poisoned".to_string()))?;

        let walk = walks.entry(code.to_string()).or_insert_with(|| {
            let open = rng.gen_range(1.0..3.0);
            Walk { open, price: open }
        });

        if self.max_step > 0.0 {
            let change = rng.gen_range(-self.max_step..=self.max_step);
            walk.price = (walk.price * (1.0 + change)).max(0.0001);
        }
        Ok(*walk)
    }
}

#[async_trait]
impl PriceSource for SimulatedPriceSource {
    async fn fetch(&self, code: &str) -> Result<Quote, FetchError> {
        let walk = self.step(code)?;
        let change_rate = (walk.price - walk.open) / walk.open * 100.0;
        let mut quote = Quote::new(code, walk.price, change_rate);
        quote.name = Some(format!("Simulated {}", code));
        Ok(quote)
    }
}
