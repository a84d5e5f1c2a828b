//! Orchestration of bulk operations: a query is submitted to run on the
//! server, polled until it finishes, and its JSONL results downloaded and
//! decoded.
//!
//! Only one bulk operation can run at a time, so any operation still running
//! is cancelled first.

use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use std::{collections::HashMap, io::BufRead, thread, time::Duration};

use crate::{
    client::Client,
    error::{Error, Result},
    order::{LineItem, Order},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Marks a JSONL line as a child of the object with the given id.
const PARENT_ID: &str = "__parentId";

const CURRENT_OPERATION: &str = "
query {
    currentBulkOperation {
        id
        status
        errorCode
        objectCount
        url
        partialDataUrl
    }
}";

const RUN_QUERY: &str = "
mutation bulkOperationRunQuery($query: String!) {
    bulkOperationRunQuery(query: $query) {
        bulkOperation { id status }
        userErrors { field message }
    }
}";

const CANCEL: &str = "
mutation bulkOperationCancel($id: ID!) {
    bulkOperationCancel(id: $id) {
        bulkOperation { id status }
        userErrors { field message }
    }
}";

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkOperationStatus {
    Created,
    Running,
    Completed,
    Canceling,
    Canceled,
    Failed,
    Expired,
    #[serde(other)]
    Unknown,
}

impl BulkOperationStatus {
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperation {
    pub id: String,
    pub status: BulkOperationStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub object_count: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub partial_data_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentData {
    current_bulk_operation: Option<BulkOperation>,
}

#[derive(Deserialize)]
struct RunData {
    #[serde(rename = "bulkOperationRunQuery")]
    payload: Payload,
}

#[derive(Deserialize)]
struct CancelData {
    #[serde(rename = "bulkOperationCancel")]
    payload: Payload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
struct UserError {
    #[serde(default)]
    field: Option<Vec<String>>,
    message: String,
}

impl Payload {
    fn check(self) -> Result<()> {
        if self.user_errors.is_empty() {
            return Ok(());
        }
        Err(Error::UserErrors(
            self.user_errors
                .into_iter()
                .map(|e| match e.field {
                    Some(field) if !field.is_empty() => format!("{}: {}", field.join("."), e.message),
                    _ => e.message,
                })
                .collect(),
        ))
    }
}

/// Runs bulk queries through a [`Client`].
pub struct BulkQuery<'a> {
    client: &'a Client,
    poll_interval: Duration,
}

impl<'a> BulkQuery<'a> {
    #[must_use]
    pub fn new(client: &'a Client) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs `query` as a bulk operation and decodes the resulting orders.
    ///
    /// # Errors
    ///
    /// Returns any error from cancelling a running operation, submitting
    /// `query`, waiting for it to finish, or downloading and decoding its
    /// results.
    pub fn run(&self, query: &str) -> Result<Vec<Order>> {
        self.cancel_running()?;
        self.submit(query)?;
        let op = self.wait()?;
        match op.url {
            Some(url) if op.object_count != Some(0) => decode_orders(self.client.download(&url)?),
            _ => {
                warn!("Bulk operation returned no results");
                Ok(Vec::new())
            }
        }
    }

    /// Returns the most recent bulk operation, if there is one.
    ///
    /// # Errors
    ///
    /// Returns any error from the query.
    pub fn current(&self) -> Result<Option<BulkOperation>> {
        let data: CurrentData = self.client.query(CURRENT_OPERATION, json!({}))?;
        Ok(data.current_bulk_operation)
    }

    /// Cancels the current bulk operation if it is still running, and waits
    /// for the cancellation to take effect.
    ///
    /// # Errors
    ///
    /// Returns any error from the queries, or the cancellation's user errors.
    pub fn cancel_running(&self) -> Result<()> {
        let Some(op) = self.current()? else {
            return Ok(());
        };
        if !op.status.is_running() {
            return Ok(());
        }
        info!("Canceling running operation {}", op.id);
        let data: CancelData = self.client.query(CANCEL, json!({ "id": op.id }))?;
        data.payload.check()?;
        while self
            .current()?
            .is_some_and(|op| op.status == BulkOperationStatus::Canceling)
        {
            info!("Bulk operation still canceling...");
            thread::sleep(self.poll_interval);
        }
        info!("Bulk operation cancelled");
        Ok(())
    }

    /// Starts `query` as a new bulk operation.
    ///
    /// # Errors
    ///
    /// Returns any error from the mutation, or its user errors.
    pub fn submit(&self, query: &str) -> Result<()> {
        let data: RunData = self.client.query(RUN_QUERY, json!({ "query": query }))?;
        data.payload.check()
    }

    /// Polls the current bulk operation until it is no longer running.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation failed or did not complete.
    pub fn wait(&self) -> Result<BulkOperation> {
        let mut op = self.current()?.ok_or(Error::NoData)?;
        while op.status.is_running() {
            info!("Bulk operation still running...");
            thread::sleep(self.poll_interval);
            op = self.current()?.ok_or(Error::NoData)?;
        }
        info!("Bulk operation finished with the status: {:?}", op.status);
        if let Some(code) = op.error_code.take() {
            return Err(Error::BulkFailed { code });
        }
        if op.status != BulkOperationStatus::Completed {
            return Err(Error::NotCompleted(op.status));
        }
        Ok(op)
    }
}

/// Decodes the JSONL results of the orders bulk query.
///
/// Nested connections come back flattened: each line item is a line of its
/// own, following its order and pointing back to it with `__parentId`.
/// Those lines are put back into their orders.
///
/// # Errors
///
/// Returns errors if:
/// * The input cannot be read
/// * A line is not a valid order or line item
/// * A line item's parent order has not been seen
pub fn decode_orders(reader: impl BufRead) -> Result<Vec<Order>> {
    let mut orders: Vec<Order> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let decode_err = |source: serde_json::Error| Error::Decode {
            line: line_no,
            source,
        };
        let mut object: Map<String, Value> = serde_json::from_str(&line).map_err(decode_err)?;
        if let Some(Value::String(parent)) = object.remove(PARENT_ID) {
            let Some(&pos) = positions.get(&parent) else {
                return Err(Error::OrphanLine {
                    line: line_no,
                    parent,
                });
            };
            let item: LineItem =
                serde_json::from_value(Value::Object(object)).map_err(decode_err)?;
            orders[pos].line_items.push(item);
        } else {
            let order: Order = serde_json::from_value(Value::Object(object)).map_err(decode_err)?;
            positions.insert(order.id.clone(), orders.len());
            orders.push(order);
        }
    }
    Ok(orders)
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use std::{fs::File, io::BufReader};

    use super::*;
    use crate::{money::Money, period::Period};

    const GRAPHQL_PATH: &str = "/admin/api/2020-10/graphql.json";

    fn client(server: &MockServer) -> Client {
        Client::with_base_url(&server.base_url(), "2020-10", "key", "secret")
    }

    fn mock_current(server: &MockServer, operation: Value) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST)
                .path(GRAPHQL_PATH)
                .body_contains("currentBulkOperation");
            then.status(200)
                .json_body(json!({ "data": { "currentBulkOperation": operation } }));
        })
    }

    fn mock_run(server: &MockServer, user_errors: Value) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST)
                .path(GRAPHQL_PATH)
                .body_contains("bulkOperationRunQuery");
            then.status(200).json_body(json!({
                "data": { "bulkOperationRunQuery": {
                    "bulkOperation": { "id": "gid://shopify/BulkOperation/2", "status": "CREATED" },
                    "userErrors": user_errors
                } }
            }));
        })
    }

    #[test]
    fn decode_orders_fn_attaches_line_items_to_parents() {
        let file = BufReader::new(File::open("testdata/orders.jsonl").unwrap());
        let orders = decode_orders(file).unwrap();
        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].name, "#1001");
        assert_eq!(orders[0].line_items.len(), 2);
        assert_eq!(orders[1].line_items.len(), 1);
        assert_eq!(orders[2].line_items.len(), 1);
        assert_eq!(orders[0].tags(), vec!["books", "go"]);
        let period = Period::parse(&["2020-04-01", "2020-04-30"]).unwrap();
        assert_eq!(orders[0].turnover(&period).unwrap(), "24.00".parse::<Money>().unwrap());
    }

    #[test]
    fn decode_orders_fn_returns_error_for_orphan_line() {
        let input = r#"{"id":"gid://shopify/LineItem/1","quantity":1,"__parentId":"gid://shopify/Order/9"}"#;
        let err = decode_orders(input.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::OrphanLine { line: 1, .. }), "{err}");
    }

    #[test]
    fn decode_orders_fn_reports_line_number_of_bad_json() {
        let input = "{\"id\":\"gid://shopify/Order/1\"}\n\n{not json\n";
        let err = decode_orders(input.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Decode { line: 3, .. }), "{err}");
    }

    #[test]
    fn run_fn_submits_polls_and_downloads_results() {
        let server = MockServer::start();
        let results = server.mock(|when, then| {
            when.method(GET).path("/results.jsonl");
            then.status(200)
                .body(std::fs::read_to_string("testdata/orders.jsonl").unwrap());
        });
        let current = mock_current(
            &server,
            json!({
                "id": "gid://shopify/BulkOperation/2",
                "status": "COMPLETED",
                "errorCode": null,
                "objectCount": "7",
                "url": server.url("/results.jsonl"),
                "partialDataUrl": null
            }),
        );
        let run = mock_run(&server, json!([]));

        let client = client(&server);
        let orders = BulkQuery::new(&client)
            .poll_interval(Duration::ZERO)
            .run("{ orders { edges { node { id } } } }")
            .unwrap();

        run.assert();
        results.assert();
        // once before submitting, once after
        assert_eq!(current.hits(), 2);
        assert_eq!(orders.len(), 3);
    }

    #[test]
    fn run_fn_returns_no_orders_when_nothing_matched() {
        let server = MockServer::start();
        mock_current(
            &server,
            json!({
                "id": "gid://shopify/BulkOperation/2",
                "status": "COMPLETED",
                "objectCount": "0",
                "url": null
            }),
        );
        mock_run(&server, json!([]));

        let client = client(&server);
        let orders = BulkQuery::new(&client)
            .poll_interval(Duration::ZERO)
            .run("{ orders { edges { node { id } } } }")
            .unwrap();
        assert!(orders.is_empty());
    }

    #[test]
    fn run_fn_returns_user_errors() {
        let server = MockServer::start();
        mock_current(&server, Value::Null);
        mock_run(
            &server,
            json!([{ "field": ["query"], "message": "Invalid bulk query" }]),
        );

        let client = client(&server);
        let err = BulkQuery::new(&client).run("{ bogus }").unwrap_err();
        assert_eq!(err.to_string(), "bulk operation rejected: query: Invalid bulk query");
    }

    #[test]
    fn wait_fn_returns_error_for_failed_operation() {
        let server = MockServer::start();
        mock_current(
            &server,
            json!({
                "id": "gid://shopify/BulkOperation/2",
                "status": "FAILED",
                "errorCode": "INTERNAL_SERVER_ERROR",
                "objectCount": "0"
            }),
        );

        let client = client(&server);
        let err = BulkQuery::new(&client).wait().unwrap_err();
        assert!(matches!(err, Error::BulkFailed { ref code } if code == "INTERNAL_SERVER_ERROR"));
    }

    #[test]
    fn wait_fn_returns_error_for_cancelled_operation() {
        let server = MockServer::start();
        mock_current(
            &server,
            json!({ "id": "gid://shopify/BulkOperation/2", "status": "CANCELED" }),
        );

        let client = client(&server);
        let err = BulkQuery::new(&client).wait().unwrap_err();
        assert!(matches!(err, Error::NotCompleted(BulkOperationStatus::Canceled)));
    }

    #[test]
    fn cancel_running_fn_cancels_running_operation() {
        let server = MockServer::start();
        mock_current(
            &server,
            json!({ "id": "gid://shopify/BulkOperation/1", "status": "RUNNING", "objectCount": 12 }),
        );
        let cancel = server.mock(|when, then| {
            when.method(POST)
                .path(GRAPHQL_PATH)
                .body_contains("bulkOperationCancel");
            then.status(200).json_body(json!({
                "data": { "bulkOperationCancel": {
                    "bulkOperation": { "id": "gid://shopify/BulkOperation/1", "status": "CANCELING" },
                    "userErrors": []
                } }
            }));
        });

        let client = client(&server);
        BulkQuery::new(&client)
            .poll_interval(Duration::ZERO)
            .cancel_running()
            .unwrap();
        cancel.assert();
    }

    #[test]
    fn cancel_running_fn_leaves_finished_operation_alone() {
        let server = MockServer::start();
        mock_current(
            &server,
            json!({ "id": "gid://shopify/BulkOperation/1", "status": "COMPLETED" }),
        );
        let cancel = server.mock(|when, then| {
            when.method(POST).body_contains("bulkOperationCancel");
            then.status(500);
        });

        let client = client(&server);
        BulkQuery::new(&client).cancel_running().unwrap();
        assert_eq!(cancel.hits(), 0);
    }

    fn wait_for_hits(mock: &httpmock::Mock<'_>, hits: usize) {
        for _ in 0..500 {
            if mock.hits() >= hits {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("mock hit {} times, want {hits}", mock.hits());
    }

    #[test]
    fn wait_fn_polls_until_operation_finishes() {
        let server = MockServer::start();
        let mut running = mock_current(
            &server,
            json!({ "id": "gid://shopify/BulkOperation/2", "status": "RUNNING", "objectCount": "1" }),
        );
        let client = client(&server);
        let query = BulkQuery::new(&client).poll_interval(Duration::from_millis(10));

        let op = thread::scope(|s| {
            let waiting = s.spawn(|| query.wait());
            wait_for_hits(&running, 3);
            mock_current(
                &server,
                json!({
                    "id": "gid://shopify/BulkOperation/2",
                    "status": "COMPLETED",
                    "objectCount": "3",
                    "url": server.url("/results.jsonl")
                }),
            );
            running.delete();
            waiting.join().unwrap()
        })
        .unwrap();

        assert_eq!(op.status, BulkOperationStatus::Completed);
        assert_eq!(op.object_count, Some(3));
    }

    #[test]
    fn cancel_running_fn_waits_while_operation_is_canceling() {
        let server = MockServer::start();
        let mut running = mock_current(
            &server,
            json!({ "id": "gid://shopify/BulkOperation/1", "status": "RUNNING" }),
        );
        let cancel = server.mock(|when, then| {
            when.method(POST)
                .path(GRAPHQL_PATH)
                .body_contains("bulkOperationCancel");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!({
                    "data": { "bulkOperationCancel": {
                        "bulkOperation": { "id": "gid://shopify/BulkOperation/1", "status": "CANCELING" },
                        "userErrors": []
                    } }
                }));
        });
        let client = client(&server);
        let query = BulkQuery::new(&client).poll_interval(Duration::from_millis(10));

        let canceled = thread::scope(|s| {
            let canceling = s.spawn(|| query.cancel_running());
            // the cancel mutation is still in flight while the status changes
            wait_for_hits(&running, 1);
            let mut still_canceling = mock_current(
                &server,
                json!({ "id": "gid://shopify/BulkOperation/1", "status": "CANCELING" }),
            );
            running.delete();
            wait_for_hits(&still_canceling, 3);
            let canceled = mock_current(
                &server,
                json!({ "id": "gid://shopify/BulkOperation/1", "status": "CANCELED" }),
            );
            still_canceling.delete();
            canceling.join().unwrap().unwrap();
            canceled.hits()
        });

        cancel.assert();
        assert!(canceled >= 1);
    }
}
