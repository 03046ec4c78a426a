//! Registry client over the HTTP/JSON API.
//!
//! Calls are addressed as `service` + `method` and posted to
//! `{base_url}/{service}/?method={method}`. See [`crate::envelope`] for the
//! response shape.

use assetsync_registry::error::{RegistryError, RegistryResult};
use assetsync_registry::operation::{
    is_benign_no_change, AssociationOutcome, EntityWrite, WriteOutcome,
};
use assetsync_registry::traits::{
    AssetRegistry, InventoryQuery, RecordOp, ReferenceLookup, Registry, RegistryFactory,
    SupplierOp,
};
use assetsync_registry::types::{
    AssetFilter, AssetTypeInfo, InstalledSoftware, ReferenceEntry, ReferenceKind, UserIdColumn,
};
use assetsync_registry::value::Record;
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::RestRegistryConfig;
use crate::envelope::{
    cell, embedded_rows, parse_count, row_count, rows, rows_at, Envelope, Row,
};
use crate::retry::RetryConfig;

const APP_CORE: &str = "com.hornbill.core";
const APP_SERVICE_MANAGER: &str = "com.hornbill.servicemanager";
const SUPPLIER_ASSETS_SERVICE: &str = "apps/com.hornbill.suppliermanager/SupplierAssets";
const SUPPLIER_CONTRACT_ASSETS_SERVICE: &str =
    "apps/com.hornbill.suppliermanager/SupplierContractAssets";

/// HTTP client for the destination registry.
#[derive(Clone)]
pub struct RestRegistryClient {
    config: Arc<RestRegistryConfig>,
    display_name: String,
    client: Client,
}

impl std::fmt::Debug for RestRegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRegistryClient")
            .field("config", &self.config)
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl RestRegistryClient {
    /// Validate the configuration and build a client.
    pub fn new(config: RestRegistryConfig) -> RegistryResult<Self> {
        config.validate()?;
        let client = Self::build_client(&config)?;
        Ok(Self::with_http_client(Arc::new(config), client))
    }

    fn with_http_client(config: Arc<RestRegistryConfig>, client: Client) -> Self {
        let display_name = format!("Registry: {}", config.base_url);
        Self {
            config,
            display_name,
            client,
        }
    }

    fn build_client(config: &RestRegistryConfig) -> RegistryResult<Client> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("ESP-APIKEY {}", config.api_key))
            .map_err(|_| RegistryError::invalid_configuration("api_key is not a valid header value"))?;
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build()
            .map_err(|e| {
                RegistryError::invalid_configuration(format!("Failed to build HTTP client: {e}"))
            })
    }

    fn method_url(&self, service: &str, method: &str) -> String {
        format!(
            "{}/{}/?method={}",
            self.config.base_url.trim_end_matches('/'),
            service,
            method
        )
    }

    /// Invoke one API method and return the `params` of a successful answer.
    ///
    /// A `false` status becomes [`RegistryError::Rejected`] with the
    /// registry's error text.
    #[instrument(skip(self, params))]
    pub async fn invoke(&self, service: &str, method: &str, params: Value) -> RegistryResult<Value> {
        let url = self.method_url(service, method);
        let body = json!({
            "@service": service,
            "@method": method,
            "params": params,
        });

        let response = self.send_with_retry(&url, &body).await?;
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            RegistryError::connection_with_source(format!("Failed to read response: {url}"), e)
        })?;

        if !status.is_success() {
            return Err(handle_response_error(status, &text));
        }

        Envelope::decode(method, &text)?.into_params(method)
    }

    /// Post with retry on transient statuses and transport failures.
    async fn send_with_retry(&self, url: &str, body: &Value) -> RegistryResult<Response> {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url = %url, attempt = attempt, "Sending registry request");

            match self.client.post(url).json(body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if RetryConfig::is_transient(status) && retry.allows_retry(attempt) {
                        let retry_after = resp
                            .headers()
                            .get(header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok());
                        let wait = retry.wait_for(attempt, status, retry_after);

                        warn!(
                            url = %url,
                            status = %status,
                            attempt = attempt,
                            wait_ms = wait.as_millis(),
                            "Transient registry status, retrying"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    if retry.allows_retry(attempt) {
                        let backoff = retry.backoff(attempt);
                        warn!(
                            url = %url,
                            error = %e,
                            attempt = attempt,
                            wait_ms = backoff.as_millis(),
                            "Registry request failed, retrying with backoff"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if e.is_timeout() {
                        return Err(RegistryError::Timeout {
                            timeout_secs: self.config.read_timeout_secs,
                        });
                    }
                    return Err(RegistryError::connection_with_source(
                        format!("Request failed after {attempt} attempts: {url}"),
                        e,
                    ));
                }
            }
        }
    }

    async fn query_exec(
        &self,
        application: &str,
        query_name: &str,
        query_params: Value,
        query_options: Value,
    ) -> RegistryResult<Value> {
        self.invoke(
            "data",
            "queryExec",
            json!({
                "application": application,
                "queryName": query_name,
                "queryParams": query_params,
                "queryOptions": query_options,
            }),
        )
        .await
    }

    /// Exact-match browse of an entity.
    async fn browse(
        &self,
        application: &str,
        entity: &str,
        filters: &[(&str, String)],
        max_results: u64,
    ) -> RegistryResult<Vec<Row>> {
        let search_filter: Vec<Value> = filters
            .iter()
            .map(|(column, value)| json!({"column": column, "value": value, "matchType": "exact"}))
            .collect();
        let params = self
            .invoke(
                "data",
                "entityBrowseRecords2",
                json!({
                    "application": application,
                    "entity": entity,
                    "searchFilter": search_filter,
                    "maxResults": max_results,
                }),
            )
            .await?;
        Ok(rows(&params))
    }

    async fn associate(
        &self,
        service: &str,
        method: &str,
        params: Value,
    ) -> RegistryResult<AssociationOutcome> {
        match self.invoke(service, method, params).await {
            Ok(params) => {
                let outcome = params.get("outcome").and_then(Value::as_str).unwrap_or("success");
                if outcome.eq_ignore_ascii_case("success") {
                    Ok(AssociationOutcome::Associated)
                } else if is_already_exists(outcome) {
                    Ok(AssociationOutcome::AlreadyExists)
                } else {
                    Err(RegistryError::rejected(method, format!("outcome: {outcome}")))
                }
            }
            Err(RegistryError::Rejected { message, .. }) if is_already_exists(&message) => {
                Ok(AssociationOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }
}

fn is_already_exists(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already exists") || lower.contains("alreadyexists")
}

/// Map a non-success HTTP status to a registry error.
fn handle_response_error(status: StatusCode, body: &str) -> RegistryError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/state/error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RegistryError::AuthenticationFailed { message }
        }
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => RegistryError::Unavailable {
            message: format!("HTTP {status}: {message}"),
        },
        _ => RegistryError::connection(format!("HTTP {status}: {message}")),
    }
}

fn write_params(write: &EntityWrite) -> Value {
    let mut params = json!({
        "application": APP_SERVICE_MANAGER,
        "entity": write.entity,
        "primaryEntityData": { "record": write.primary },
    });
    if let Some(related) = &write.related {
        params["relatedEntityData"] = json!({
            "relationshipName": related.relationship,
            "entityAction": related.action.as_str(),
            "record": related.record,
        });
    }
    params
}

/// Query result type name for the records of an asset class.
fn records_query_type(class: &str) -> String {
    let mut chars = class.chars();
    match chars.next() {
        Some(first) => format!("records{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "records".to_string(),
    }
}

/// Value of the configured user column; the list query spells attribute 1
/// without the inner underscore.
fn user_key(row: &Row, column: UserIdColumn) -> String {
    let key = cell(row, column.as_str());
    if key.is_empty() && column == UserIdColumn::Attrib1 {
        return cell(row, "h_attrib1");
    }
    key
}

fn user_display_name(row: &Row) -> String {
    format!("{} {}", cell(row, "h_first_name"), cell(row, "h_last_name"))
        .trim()
        .to_string()
}

#[async_trait]
impl Registry for RestRegistryClient {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn test_connection(&self) -> RegistryResult<()> {
        self.invoke("session", "getSessionInfo", json!({})).await?;
        Ok(())
    }

    async fn installed_applications(&self) -> RegistryResult<Vec<String>> {
        let params = self.invoke("session", "getApplicationList", json!({})).await?;
        let apps = rows_at(params.get("application"))
            .iter()
            .map(|row| cell(row, "name"))
            .filter(|name| !name.is_empty())
            .collect();
        Ok(apps)
    }
}

#[async_trait]
impl RecordOp for RestRegistryClient {
    #[instrument(skip(self, write), fields(entity = %write.entity))]
    async fn add_record(&self, write: &EntityWrite) -> RegistryResult<String> {
        let params = self
            .invoke("data", "entityAddRecord", write_params(write))
            .await?;

        let record = params
            .pointer("/primaryEntityData/record")
            .and_then(Value::as_object)
            .ok_or_else(|| RegistryError::protocol("entityAddRecord: missing primary record"))?;
        record
            .iter()
            .find(|(column, _)| column.starts_with("h_pk_"))
            .map(|(column, _)| cell(record, column))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RegistryError::protocol("entityAddRecord: missing primary key"))
    }

    #[instrument(skip(self, write), fields(entity = %write.entity))]
    async fn update_record(&self, write: &EntityWrite) -> RegistryResult<WriteOutcome> {
        match self
            .invoke("data", "entityUpdateRecord", write_params(write))
            .await
        {
            Ok(_) => Ok(WriteOutcome::Applied),
            Err(RegistryError::Rejected { message, .. }) if is_benign_no_change(&message) => {
                Ok(WriteOutcome::NoChange { message })
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_record(&self, entity: &str, key: &str) -> RegistryResult<()> {
        self.invoke(
            "data",
            "entityDeleteRecord",
            json!({
                "application": APP_SERVICE_MANAGER,
                "entity": entity,
                "keyValue": key,
            }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReferenceLookup for RestRegistryClient {
    #[instrument(skip(self))]
    async fn search_reference(
        &self,
        kind: ReferenceKind,
        value: &str,
        user_column: UserIdColumn,
    ) -> RegistryResult<Option<ReferenceEntry>> {
        let entry = match kind {
            ReferenceKind::Site => self
                .browse(APP_CORE, "Site", &[("h_site_name", value.to_string())], 1)
                .await?
                .first()
                .map(|row| ReferenceEntry::new(kind, value, cell(row, "h_id"), cell(row, "h_site_name"))),
            ReferenceKind::User => self
                .browse(APP_CORE, "UserAccount", &[(user_column.as_str(), value.to_string())], 1)
                .await?
                .first()
                .map(|row| {
                    ReferenceEntry::new(kind, value, cell(row, "h_user_id"), user_display_name(row))
                }),
            ReferenceKind::Company | ReferenceKind::Department => {
                let group_type = kind.group_type().unwrap_or_default().to_string();
                self.browse(
                    APP_CORE,
                    "Group",
                    &[("h_name", value.to_string()), ("h_type", group_type)],
                    1,
                )
                .await?
                .first()
                .map(|row| ReferenceEntry::new(kind, value, cell(row, "h_id"), cell(row, "h_name")))
            }
        };
        Ok(entry.filter(|e| !e.id.is_empty()))
    }

    async fn count_references(&self, kind: ReferenceKind) -> RegistryResult<u64> {
        match kind {
            ReferenceKind::Site => {
                let params = self
                    .invoke(
                        "apps/com.hornbill.core",
                        "getSitesList",
                        json!({"rowstart": 0, "limit": 1}),
                    )
                    .await?;
                parse_count("getSitesList", params.get("count"))
            }
            ReferenceKind::User => {
                let params = self
                    .query_exec(APP_CORE, "getUserAccountsList", json!({"getCount": true}), json!({}))
                    .await?;
                row_count("getUserAccountsList", &params)
            }
            ReferenceKind::Company | ReferenceKind::Department => {
                let params = self
                    .invoke(
                        "admin",
                        "groupGetList2",
                        json!({
                            "singleLevelOnly": false,
                            "type": kind.as_str(),
                            "pageInfo": {"pageIndex": 1, "pageSize": 1},
                        }),
                    )
                    .await?;
                // One group per page, so the page count is the group count.
                parse_count("groupGetList2", params.get("maxPages"))
            }
        }
    }

    async fn fetch_references(
        &self,
        kind: ReferenceKind,
        user_column: UserIdColumn,
        offset: u64,
        limit: u64,
    ) -> RegistryResult<Vec<ReferenceEntry>> {
        let entries = match kind {
            ReferenceKind::Site => {
                let params = self
                    .invoke(
                        "apps/com.hornbill.core",
                        "getSitesList",
                        json!({
                            "rowstart": offset,
                            "limit": limit,
                            "orderByField": "h_site_name",
                            "orderByWay": "ascending",
                        }),
                    )
                    .await?;
                embedded_rows("getSitesList", params.get("sites"))?
                    .iter()
                    .map(|row| {
                        let name = cell(row, "h_site_name");
                        ReferenceEntry::new(kind, name.clone(), cell(row, "h_id"), name)
                    })
                    .collect::<Vec<_>>()
            }
            ReferenceKind::User => {
                let params = self
                    .query_exec(
                        APP_CORE,
                        "getUserAccountsList",
                        json!({"rowstart": offset, "limit": limit}),
                        json!({}),
                    )
                    .await?;
                rows(&params)
                    .iter()
                    .map(|row| {
                        ReferenceEntry::new(
                            kind,
                            user_key(row, user_column),
                            cell(row, "h_user_id"),
                            user_display_name(row),
                        )
                    })
                    .collect()
            }
            ReferenceKind::Company | ReferenceKind::Department => {
                let page_size = limit.max(1);
                let params = self
                    .invoke(
                        "admin",
                        "groupGetList2",
                        json!({
                            "singleLevelOnly": false,
                            "type": kind.as_str(),
                            "orderBy": {"column": "h_name", "direction": "ascending"},
                            "pageInfo": {"pageIndex": offset / page_size + 1, "pageSize": page_size},
                        }),
                    )
                    .await?;
                rows_at(params.get("group"))
                    .iter()
                    .filter(|row| cell(row, "type") == kind.as_str())
                    .map(|row| {
                        let name = cell(row, "name");
                        ReferenceEntry::new(kind, name.clone(), cell(row, "id"), name)
                    })
                    .collect()
            }
        };
        Ok(entries
            .into_iter()
            .filter(|e| !e.key.is_empty() && !e.id.is_empty())
            .collect())
    }
}

#[async_trait]
impl InventoryQuery for RestRegistryClient {
    async fn asset_type_info(&self, asset_type: &str) -> RegistryResult<Option<AssetTypeInfo>> {
        let rows = self
            .browse(
                APP_SERVICE_MANAGER,
                "AssetsTypes",
                &[("h_name", asset_type.to_string())],
                1,
            )
            .await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let type_id = cell(row, "h_pk_type_id").parse::<i64>().map_err(|_| {
            RegistryError::protocol(format!("AssetsTypes: invalid type id for {asset_type}"))
        })?;
        Ok(Some(AssetTypeInfo {
            name: asset_type.to_string(),
            class: cell(row, "h_class"),
            type_id,
        }))
    }

    #[instrument(skip(self), fields(class = %filter.class, type_id = filter.type_id))]
    async fn count_assets(&self, filter: &AssetFilter) -> RegistryResult<u64> {
        let mut query_params = json!({"classId": filter.class});
        if filter.type_id != 0 {
            query_params["typeId"] = json!(filter.type_id);
        }
        let params = self
            .query_exec(
                APP_SERVICE_MANAGER,
                "getAssetsListForImport",
                query_params,
                json!({"queryType": "count"}),
            )
            .await?;
        row_count("getAssetsListForImport", &params)
    }

    async fn fetch_assets(
        &self,
        filter: &AssetFilter,
        offset: u64,
        limit: u64,
    ) -> RegistryResult<Vec<Record>> {
        let mut query_params = json!({
            "rowstart": offset,
            "limit": limit,
            "classId": filter.class,
        });
        if filter.type_id != 0 {
            query_params["typeId"] = json!(filter.type_id);
        }
        let params = self
            .query_exec(
                APP_SERVICE_MANAGER,
                "getAssetsListForImport",
                query_params,
                json!({
                    "queryType": records_query_type(&filter.class),
                    "inPolicyInclusion": true,
                }),
            )
            .await?;
        Ok(rows(&params).iter().map(Record::from_json_object).collect())
    }

    async fn count_installed_software(&self, asset_id: &str) -> RegistryResult<u64> {
        let params = self
            .query_exec(
                APP_SERVICE_MANAGER,
                "Asset.getInstalledSoftware",
                json!({"assetId": asset_id}),
                json!({"resultType": "count"}),
            )
            .await?;
        row_count("Asset.getInstalledSoftware", &params)
    }

    async fn fetch_installed_software(
        &self,
        asset_id: &str,
        offset: u64,
        limit: u64,
    ) -> RegistryResult<Vec<InstalledSoftware>> {
        let params = self
            .query_exec(
                APP_SERVICE_MANAGER,
                "Asset.getInstalledSoftware",
                json!({"assetId": asset_id, "rowstart": offset, "limit": limit}),
                json!({"resultType": "data"}),
            )
            .await?;

        rows(&params)
            .iter()
            .map(|row| -> RegistryResult<InstalledSoftware> {
                let pk = cell(row, "h_pk_id");
                let pk_id = pk.parse::<i64>().map_err(|_| {
                    RegistryError::protocol(format!(
                        "Asset.getInstalledSoftware: invalid h_pk_id {pk:?}"
                    ))
                })?;
                Ok(InstalledSoftware {
                    pk_id,
                    app_id: cell(row, "h_app_id"),
                    app_name: cell(row, "h_app_name"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl SupplierOp for RestRegistryClient {
    async fn associate_supplier(
        &self,
        asset_id: &str,
        supplier_id: &str,
    ) -> RegistryResult<AssociationOutcome> {
        self.associate(
            SUPPLIER_ASSETS_SERVICE,
            "addSupplierAsset",
            json!({"supplierId": supplier_id, "assetId": asset_id}),
        )
        .await
    }

    async fn associate_contract(
        &self,
        asset_id: &str,
        contract_id: &str,
    ) -> RegistryResult<AssociationOutcome> {
        self.associate(
            SUPPLIER_CONTRACT_ASSETS_SERVICE,
            "addSupplierContractAsset",
            json!({"supplierContractId": contract_id, "assetId": asset_id}),
        )
        .await
    }
}

/// Hands each worker a client sharing one connection pool.
#[derive(Debug, Clone)]
pub struct RestRegistryFactory {
    template: RestRegistryClient,
}

impl RestRegistryFactory {
    pub fn new(config: RestRegistryConfig) -> RegistryResult<Self> {
        Ok(Self {
            template: RestRegistryClient::new(config)?,
        })
    }

    /// A client for the run's setup phase (preloads, caches).
    #[must_use]
    pub fn client(&self) -> RestRegistryClient {
        self.template.clone()
    }
}

impl RegistryFactory for RestRegistryFactory {
    fn connect(&self) -> RegistryResult<Arc<dyn AssetRegistry>> {
        Ok(Arc::new(RestRegistryClient::with_http_client(
            Arc::clone(&self.template.config),
            self.template.client.clone(),
        )))
    }
}
