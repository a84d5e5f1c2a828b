use anyhow::Result;
use log::info;

use std::time::Duration;

use crate::{
    bulk::{BulkQuery, DEFAULT_POLL_INTERVAL},
    cache::Cache,
    client::Client,
    order::Order,
    period::Period,
};

/// Fetches orders from the store, optionally through a local [`Cache`].
pub struct Shop {
    client: Client,
    cache: Option<Cache>,
    poll_interval: Duration,
}

impl Shop {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns every order created, updated or processed during `period`.
    ///
    /// With a cache, orders already cached for `period` are returned without
    /// contacting the store, and freshly fetched orders are cached.
    ///
    /// # Errors
    ///
    /// Returns any error from reading or writing the cache, or from the bulk
    /// query.
    pub fn list_orders(&self, period: &Period) -> Result<Vec<Order>> {
        if let Some(cache) = &self.cache {
            if let Some(orders) = cache.read(period)? {
                info!("Using cached orders from {}", cache.path().display());
                return Ok(orders);
            }
        }
        info!("Getting orders in the range {period}");
        let orders = BulkQuery::new(&self.client)
            .poll_interval(self.poll_interval)
            .run(&orders_query(period))?;
        if let Some(cache) = &self.cache {
            cache.write(period, &orders)?;
        }
        Ok(orders)
    }
}

/// Returns the bulk query document selecting the orders for `period`.
#[must_use]
pub fn orders_query(period: &Period) -> String {
    format!(
        r#"
{{
    orders(query: "{}") {{
        edges {{
            node {{
                id
                name
                shippingAddress {{
                    countryCodeV2
                }}
                taxLines {{
                    rate
                    title
                }}
                transactions {{
                    processedAt
                    status
                    kind
                    test
                    amountSet {{
                        shopMoney {{
                            amount
                            currencyCode
                        }}
                    }}
                }}
                lineItems {{
                    edges {{
                        node {{
                            id
                            quantity
                            unfulfilledQuantity
                            vendor
                            product {{
                                tags
                            }}
                        }}
                    }}
                }}
            }}
        }}
    }}
}}"#,
        period.search_query()
    )
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::cache::DEFAULT_CACHE_FILE;

    fn april() -> Period {
        Period::parse(&["2020-04-01", "2020-04-30"]).unwrap()
    }

    #[test]
    fn orders_query_fn_embeds_period_filter() {
        let query = orders_query(&april());
        assert!(query.contains(r#"orders(query: "(created_at:>='2020-04-01T00:00:00Z'"#));
        assert!(query.contains("unfulfilledQuantity"));
    }

    #[test]
    fn list_orders_fn_fetches_and_caches_orders() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/results.jsonl");
            then.status(200)
                .body(std::fs::read_to_string("testdata/orders.jsonl").unwrap());
        });
        let current = server.mock(|when, then| {
            when.method(POST).body_contains("currentBulkOperation");
            then.status(200).json_body(json!({ "data": { "currentBulkOperation": {
                "id": "gid://shopify/BulkOperation/3",
                "status": "COMPLETED",
                "objectCount": "7",
                "url": server.url("/results.jsonl")
            } } }));
        });
        let run = server.mock(|when, then| {
            when.method(POST)
                .body_contains("bulkOperationRunQuery")
                .body_contains("processed_at:<='2020-04-30T23:59:59Z'");
            then.status(200).json_body(json!({ "data": { "bulkOperationRunQuery": {
                "bulkOperation": { "id": "gid://shopify/BulkOperation/3", "status": "CREATED" },
                "userErrors": []
            } } }));
        });

        let dir = tempfile::tempdir().unwrap();
        let client = Client::with_base_url(&server.base_url(), "2020-10", "key", "secret");
        let shop = Shop::new(client)
            .with_cache(Cache::new(dir.path().join(DEFAULT_CACHE_FILE)))
            .poll_interval(Duration::ZERO);

        let fetched = shop.list_orders(&april()).unwrap();
        assert_eq!(fetched.len(), 3);
        run.assert();

        let cached = shop.list_orders(&april()).unwrap();
        assert_eq!(cached, fetched);
        run.assert_hits(1);
        assert_eq!(current.hits(), 2);
    }
}
