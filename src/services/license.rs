//! Process-wide Flickr license table with single-flight population.
//!
//! The table changes essentially never, so it is fetched at most once per
//! process: the first caller populates it (consulting the shared cache before
//! going to the network) while concurrent first-callers await the same
//! in-flight initialization instead of racing duplicate fetches.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::cache::{License, MazeCache};
use crate::services::flickr::api::FlickrClient;
use crate::services::ServiceError;

pub struct LicenseTable {
    cell: OnceCell<Arc<HashMap<String, License>>>,
}

impl LicenseTable {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// The license table, populated on first access.
    ///
    /// A failed fetch leaves the cell empty so a later call can retry; no
    /// lock is held across the network call.
    pub async fn get_or_fetch(
        &self,
        client: &FlickrClient,
        cache: &MazeCache,
    ) -> Result<Arc<HashMap<String, License>>, ServiceError> {
        let table = self
            .cell
            .get_or_try_init(|| async {
                if let Some(table) = cache.get_licenses() {
                    return Ok(table);
                }
                let records = client.license_list().await?;
                let mut table = HashMap::new();
                for record in records {
                    table.insert(
                        record.id,
                        License {
                            name: record.name,
                            url: record.url,
                        },
                    );
                }
                let table = Arc::new(table);
                cache.set_licenses(table.clone());
                Ok::<_, ServiceError>(table)
            })
            .await?;
        Ok(table.clone())
    }
}

impl Default for LicenseTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn body() -> &'static str {
        r#"{
            "licenses": {"license": [
                {"id": "0", "name": "All Rights Reserved", "url": ""},
                {"id": "4", "name": "CC BY 2.0", "url": "https://creativecommons.org/licenses/by/2.0/"}
            ]},
            "stat": "ok"
        }"#
    }

    fn client_for(server: &Server) -> FlickrClient {
        FlickrClient::with_base_urls(
            "k".to_string(),
            "s".to_string(),
            format!("{}/rest", server.url()),
            format!("{}/oauth", server.url()),
        )
    }

    #[tokio::test]
    async fn test_fetches_once_and_memoizes() {
        let mut server = Server::new_async().await;
        // expect(1): a second network call would fail the assertion below.
        let mock = server
            .mock("GET", "/rest")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body())
            .expect(1)
            .create_async()
            .await;

        let table = LicenseTable::new();
        let cache = MazeCache::new(Duration::from_secs(60));
        let client = client_for(&server);

        let first = table.get_or_fetch(&client, &cache).await.unwrap();
        let second = table.get_or_fetch(&client, &cache).await.unwrap();

        assert_eq!(first.get("4").unwrap().name, "CC BY 2.0");
        assert!(Arc::ptr_eq(&first, &second));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_first_access_single_fetch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body())
            .expect(1)
            .create_async()
            .await;

        let table = Arc::new(LicenseTable::new());
        let cache = Arc::new(MazeCache::new(Duration::from_secs(60)));
        let client = Arc::new(client_for(&server));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (table, cache, client) = (table.clone(), cache.clone(), client.clone());
            handles.push(tokio::spawn(async move {
                table.get_or_fetch(&client, &cache).await.unwrap()
            }));
        }
        for handle in handles {
            let t = handle.await.unwrap();
            assert_eq!(t.len(), 2);
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_shared_cache_hit_skips_network() {
        let server = Server::new_async().await;
        let table = LicenseTable::new();
        let cache = MazeCache::new(Duration::from_secs(60));

        let mut prefilled = HashMap::new();
        prefilled.insert(
            "1".to_string(),
            License {
                name: "CC BY-NC-SA 2.0".to_string(),
                url: String::new(),
            },
        );
        cache.set_licenses(Arc::new(prefilled));

        // No mock registered: any network call would error out.
        let client = client_for(&server);
        let got = table.get_or_fetch(&client, &cache).await.unwrap();
        assert_eq!(got.get("1").unwrap().name, "CC BY-NC-SA 2.0");
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cell_retryable() {
        let mut server = Server::new_async().await;
        let _fail = server
            .mock("GET", "/rest")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("oops")
            .expect(1)
            .create_async()
            .await;

        let table = LicenseTable::new();
        let cache = MazeCache::new(Duration::from_secs(60));
        let client = client_for(&server);

        assert!(table.get_or_fetch(&client, &cache).await.is_err());

        // A later call retries and succeeds.
        let _ok = server
            .mock("GET", "/rest")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body())
            .create_async()
            .await;
        let got = table.get_or_fetch(&client, &cache).await.unwrap();
        assert_eq!(got.len(), 2);
    }
}
