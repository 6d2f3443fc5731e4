use crate::config::DatasourceConfig;
use crate::gateway::{AsyncTryFrom, DatasourceGateway, Error};
use async_trait::async_trait;
use log::debug;
use query_engine::{Column, ColumnSet, ResolvedWindow};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::Url;

const FORMAT_CLAUSE: &str = "FORMAT JSON";

#[derive(Debug)]
struct Endpoint {
    url: Url,
    user: Option<String>,
    password: Option<String>,
}

/// Gateway over the ClickHouse HTTP interface.
#[derive(Debug)]
pub struct ClickHouseGateway {
    client: reqwest::Client,
    endpoints: HashMap<String, Endpoint>,
}

impl ClickHouseGateway {
    pub fn new(datasources: &[DatasourceConfig]) -> Result<Self, Error> {
        let mut endpoints = HashMap::new();
        for ds in datasources {
            endpoints.insert(ds.name.clone(), endpoint(ds)?);
        }

        Ok(Self {
            client: reqwest::Client::builder().build()?,
            endpoints,
        })
    }
}

fn endpoint(ds: &DatasourceConfig) -> Result<Endpoint, Error> {
    let mut url = Url::parse(&ds.url)?;
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(database) = &ds.database {
            pairs.append_pair("database", database);
        }
        // Keep UInt64 counts numeric in JSON output.
        pairs.append_pair("output_format_json_quote_64bit_integers", "0");
    }

    Ok(Endpoint {
        url,
        user: ds.user.clone(),
        password: ds.password.clone(),
    })
}

#[async_trait]
impl DatasourceGateway for ClickHouseGateway {
    async fn execute(
        &self,
        datasource: &str,
        sql: &str,
        window: &ResolvedWindow,
    ) -> Result<ColumnSet, Error> {
        let endpoint = self
            .endpoints
            .get(datasource)
            .ok_or_else(|| Error::UnknownDatasource(datasource.to_string()))?;

        debug!("Executing query on {} over {}", datasource, window);
        let mut request = self
            .client
            .post(endpoint.url.clone())
            .body(format!("{}\n{}", sql, FORMAT_CLAUSE));
        if let Some(user) = &endpoint.user {
            request = request.basic_auth(user, endpoint.password.as_ref());
        }

        let response = request.send().await?;
        let JsonResult(columns) = <JsonResult as AsyncTryFrom<_>>::try_from(response).await?;
        Ok(columns)
    }
}

#[derive(Deserialize)]
struct JsonFrame {
    meta: Option<Vec<ColumnMeta>>,
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
struct ColumnMeta {
    name: String,
}

pub struct JsonResult(pub ColumnSet);

#[async_trait]
impl AsyncTryFrom<reqwest::Response> for JsonResult {
    type Error = Error;

    async fn try_from(response: reqwest::Response) -> Result<Self, Self::Error> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                status,
                body: body.trim().to_string(),
            });
        }

        decode(&body).map(JsonResult)
    }
}

fn decode(body: &str) -> Result<ColumnSet, Error> {
    if body.trim().is_empty() {
        return Err(Error::NoFrames);
    }

    let frame: JsonFrame = serde_json::from_str(body)?;
    let Some(meta) = frame.meta else {
        return Err(Error::NoFrames);
    };
    if frame.data.is_empty() {
        return Ok(ColumnSet::default());
    }

    let columns = meta
        .into_iter()
        .map(|m| {
            let values = frame
                .data
                .iter()
                .map(|row| row.get(&m.name).cloned().unwrap_or(Value::Null))
                .collect();
            Column::new(m.name, values)
        })
        .collect();
    Ok(ColumnSet::new(columns))
}
