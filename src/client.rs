use crate::config::ServiceConfig;
use crate::error::{LedgerError, Result};
use crate::schema::LedgerRow;
use crate::sync::{errors_member, BalanceUpdate, LedgerService, UpdateResponse};
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const READ_QUERY: &str = r#"
query {
  executesp_readData { id account_name classification partner_id_name Store Balance Year MonthName Month FinancialYearMonth last_modified_at last_modified_user }
}
"#;

pub const UPDATE_MUTATION: &str = r#"
mutation updateBalance($id: Int!, $balance: Float, $last_modified_at: DateTime, $last_modified_user: String) {
  executesp_updateBalance(id: $id, balance: $balance, last_modified_at: $last_modified_at, last_modified_user: $last_modified_user) { rows_updated }
}
"#;

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    /// `Some` whenever the body carries an `errors` key, whatever its value.
    #[serde(default, deserialize_with = "errors_member")]
    errors: Option<Vec<Value>>,
}

/// Maps a read response to rows. An `errors` member or a missing
/// `executesp_readData` field fails the read; a `null` list is an empty ledger.
fn rows_from_read(body: GraphQlResponse) -> Result<Vec<LedgerRow>> {
    if let Some(errors) = body.errors {
        return Err(LedgerError::FetchFailed(format!(
            "service returned errors: {}",
            Value::Array(errors)
        )));
    }

    let items = body
        .data
        .and_then(|mut d| d.get_mut("executesp_readData").map(Value::take))
        .ok_or_else(|| {
            LedgerError::FetchFailed("response missing executesp_readData".to_string())
        })?;

    match items {
        Value::Null => Ok(Vec::new()),
        other => serde_json::from_value(other).map_err(|e| {
            LedgerError::FetchFailed(format!("unreadable executesp_readData: {}", e))
        }),
    }
}

fn update_from_body(body: GraphQlResponse) -> UpdateResponse {
    let rows_updated = body
        .data
        .as_ref()
        .and_then(|d| d.get("executesp_updateBalance"))
        .and_then(|r| r.get("rows_updated"))
        .and_then(Value::as_i64);

    UpdateResponse {
        rows_updated,
        errors: body.errors,
    }
}

/// [`LedgerService`] over the ledger's GraphQL endpoint.
#[derive(Clone)]
pub struct GraphQlLedgerClient {
    client: Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl GraphQlLedgerClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("ledger-insights/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            bearer_token: config.bearer_token.clone(),
        })
    }

    async fn run_graphql(&self, query: &str, variables: Option<Value>) -> Result<GraphQlResponse> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&GraphQlRequest { query, variables });
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let res = request.send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(LedgerError::Remote(format!(
                "GraphQL request failed (status {}): {}",
                status, err_text
            )));
        }

        Ok(res.json().await?)
    }
}

impl LedgerService for GraphQlLedgerClient {
    async fn fetch_ledger_rows(&self) -> Result<Vec<LedgerRow>> {
        let body = self.run_graphql(READ_QUERY, None).await.map_err(|e| {
            warn!("Ledger read failed: {}", e);
            LedgerError::FetchFailed(e.to_string())
        })?;

        let rows = rows_from_read(body)?;
        debug!("Read {} ledger rows", rows.len());
        Ok(rows)
    }

    async fn apply_balance_update(&self, update: &BalanceUpdate) -> Result<UpdateResponse> {
        let variables = json!({
            "id": update.id,
            "balance": update.balance.to_f64().unwrap_or(0.0),
            "last_modified_at": update.modified_at,
            "last_modified_user": update.modified_user,
        });

        let body = self.run_graphql(UPDATE_MUTATION, Some(variables)).await?;
        Ok(update_from_body(body))
    }
}
