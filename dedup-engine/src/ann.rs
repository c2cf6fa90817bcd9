//! Qdrant-backed approximate nearest-neighbour lookup for the `>50` item
//! path of [`crate::DedupEngine`]. Mirrors the connect/upsert/search shape
//! used for code-symbol search, but keyed by PR/issue number and scoped to
//! a throwaway collection per scan.

use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::debug;

pub struct AnnStore {
    client: Qdrant,
    collection: String,
    dim: usize,
}

impl AnnStore {
    pub async fn connect(url: &str, collection: &str, dim: usize) -> Result<Self, String> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| format!("qdrant client build: {e}"))?;

        let _ = client.delete_collection(collection).await;
        client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Euclid)),
            )
            .await
            .map_err(|e| format!("create_collection: {e}"))?;

        Ok(AnnStore {
            client,
            collection: collection.to_string(),
            dim,
        })
    }

    pub async fn upsert_all(&self, vectors: &[(i64, Vec<f32>)]) -> Result<(), String> {
        let points: Vec<PointStruct> = vectors
            .iter()
            .map(|(number, vector)| PointStruct::new(*number as u64, vector.clone(), qdrant_client::Payload::new()))
            .collect();
        if points.is_empty() {
            return Ok(());
        }
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
            .await
            .map_err(|e| format!("upsert_points: {e}"))?;
        Ok(())
    }

    /// Top-20 neighbours for `vector`, returned as `(number, cosine_similarity)`
    /// assuming normalised inputs: `cosine = 1 - l2_distance / 2`.
    pub async fn search_top20(&self, number: i64, vector: &[f32]) -> Result<Vec<(i64, f64)>, String> {
        debug!(number, dim = self.dim, "ann search_top20");
        let resp = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), 20).with_payload(false),
            )
            .await
            .map_err(|e| format!("search_points: {e}"))?;

        Ok(resp
            .result
            .into_iter()
            .filter_map(|sp| {
                let id = match sp.id?.point_id_options? {
                    qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => n as i64,
                    qdrant_client::qdrant::point_id::PointIdOptions::Uuid(_) => return None,
                };
                if id == number {
                    return None;
                }
                // qdrant returns squared L2 distance by default when using
                // the Euclid metric's similarity score; the client already
                // reports it as distance-like `score`, so the conversion
                // below assumes `score` is `d` on normalised vectors.
                let cosine = 1.0 - (sp.score as f64) / 2.0;
                Some((id, cosine))
            })
            .collect())
    }
}
