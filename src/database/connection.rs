use bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};

pub async fn get_db_client(database_url: &str, database_name: &str) -> Database {
    let client = Client::with_uri_str(database_url)
        .await
        .expect("Failed to connect to MongoDB");

    let db = client.database(database_name);

    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!("Connected to database: {}", database_name);
            tracing::debug!("Collections found: {:?}", collections);
        }
        Err(e) => {
            tracing::error!(
                "Database '{}' may not exist or is inaccessible: {}",
                database_name,
                e
            );
        }
    }

    ensure_indexes(&db).await;

    db
}

/// At most one subscription per agent may sit in a consumable state. The
/// partial filter leaves cancelled and expired records out, so an agent can
/// resubscribe after cancelling while two racing subscribe calls still
/// collide on the index.
pub fn subscription_agent_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "agent": 1 })
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(doc! {
                    "status": { "$in": ["active", "pending"] },
                })
                .build(),
        )
        .build()
}

/// Gateway references are the idempotency keys for verification.
pub fn transaction_reference_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "transactionId": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn ensure_indexes(db: &Database) {
    db.collection::<Document>("subscriptions")
        .create_index(subscription_agent_index())
        .await
        .expect("Failed to create subscriptions agent index");
    db.collection::<Document>("transactions")
        .create_index(transaction_reference_index())
        .await
        .expect("Failed to create transactions reference index");
    tracing::info!("Database indexes ensured");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_uniqueness_covers_only_consumable_states() {
        let index = subscription_agent_index();
        assert_eq!(index.keys, doc! { "agent": 1 });

        let options = index.options.unwrap();
        assert_eq!(options.unique, Some(true));

        // Cancelled/expired records fall outside the partial filter, so a
        // resubscribe after cancellation is not blocked by the old record.
        let filter = options.partial_filter_expression.unwrap();
        let states = filter
            .get_document("status")
            .unwrap()
            .get_array("$in")
            .unwrap();
        let states: Vec<&str> = states.iter().filter_map(|s| s.as_str()).collect();
        assert_eq!(states, vec!["active", "pending"]);
    }

    #[test]
    fn transaction_reference_is_unique() {
        let index = transaction_reference_index();
        assert_eq!(index.keys, doc! { "transactionId": 1 });
        assert_eq!(index.options.unwrap().unique, Some(true));
    }
}
