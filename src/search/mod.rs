//! Tantivy-based search index module.
//!
//! Full-text search over client profiles with field boosting. Every query is
//! restricted to a single coach's roster.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::ClientRecord;

const BOOST_NAME: f32 = 10.0;
const BOOST_EMAIL: f32 = 6.0;
const BOOST_GOAL: f32 = 4.0;
const BOOST_PROGRAM: f32 = 4.0;
const BOOST_NOTES: f32 = 2.0;

/// Deepest result position a search will collect.
pub const MAX_SEARCH_WINDOW: usize = 10_000;

/// Search result with client id and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub client_id: String,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    client_id: Field,
    coach_id: Field,
    name: Field,
    email: Field,
    goal: Field,
    program: Field,
    notes: Field,
}

/// Tantivy search index for client records.
pub struct ClientSearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl ClientSearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        let client_id = schema_builder.add_text_field("client_id", STRING | STORED);
        let coach_id = schema_builder.add_text_field("coach_id", STRING);
        let name = schema_builder.add_text_field("name", TEXT | STORED);
        let email = schema_builder.add_text_field("email", TEXT);
        let goal = schema_builder.add_text_field("goal", TEXT);
        let program = schema_builder.add_text_field("program", TEXT);
        let notes = schema_builder.add_text_field("notes", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            client_id,
            coach_id,
            name,
            email,
            goal,
            program,
            notes,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from the given clients.
    pub async fn rebuild(&self, clients: &[ClientRecord]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for client in clients {
            writer.add_document(self.create_document(client))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} clients", clients.len());
        Ok(())
    }

    /// Index or re-index a single client.
    pub async fn index_client(&self, client: &ClientRecord) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.client_id, &client.id));
        writer.add_document(self.create_document(client))?;
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Remove a client from the index.
    pub async fn remove_client(&self, client_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.client_id, client_id));
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Search a coach's clients.
    pub fn search(
        &self,
        coach_id: &str,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, AppError> {
        // tantivy rejects a zero-sized collector
        if query_str.trim().is_empty() || limit == 0 || offset >= MAX_SEARCH_WINDOW {
            return Ok(Vec::new());
        }
        let window = limit.saturating_add(offset).min(MAX_SEARCH_WINDOW);

        let searcher = self.reader.searcher();

        let field_queries = [
            (self.fields.name, BOOST_NAME),
            (self.fields.email, BOOST_EMAIL),
            (self.fields.goal, BOOST_GOAL),
            (self.fields.program, BOOST_PROGRAM),
            (self.fields.notes, BOOST_NOTES),
        ];

        let mut text_queries: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                text_queries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        if text_queries.is_empty() {
            return Err(AppError::Search(format!(
                "Invalid search query: {}",
                query_str
            )));
        }

        let coach_query = TermQuery::new(
            Term::from_field_text(self.fields.coach_id, coach_id),
            IndexRecordOption::Basic,
        );
        let combined_query = BooleanQuery::new(vec![
            (Occur::Must, Box::new(coach_query) as Box<dyn Query>),
            (
                Occur::Must,
                Box::new(BooleanQuery::new(text_queries)) as Box<dyn Query>,
            ),
        ]);

        let top_docs = searcher
            .search(&combined_query, &TopDocs::with_limit(window))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let client_id = doc.get_first(self.fields.client_id)?.as_str()?.to_string();
                Some(SearchResult { client_id, score })
            })
            .collect();

        Ok(results)
    }

    fn create_document(&self, client: &ClientRecord) -> TantivyDocument {
        doc!(
            self.fields.client_id => client.id.clone(),
            self.fields.coach_id => client.coach_id.clone(),
            self.fields.name => client.name.clone(),
            self.fields.email => client.email.clone().unwrap_or_default(),
            self.fields.goal => client.goal.clone().unwrap_or_default(),
            self.fields.program => client.program.clone().unwrap_or_default(),
            self.fields.notes => client.notes.clone().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_client(id: &str, coach_id: &str, name: &str, goal: &str) -> ClientRecord {
        let mut client = ClientRecord::new(id, name, Utc::now());
        client.coach_id = coach_id.to_string();
        client.goal = Some(goal.to_string());
        client
    }

    #[tokio::test]
    async fn test_search_matches_name_and_goal() {
        let temp_dir = TempDir::new().unwrap();
        let index = ClientSearchIndex::open(temp_dir.path()).unwrap();

        let clients = vec![
            create_test_client("1", "coach", "Ann Lee", "Lose weight"),
            create_test_client("2", "coach", "Bo Park", "Marathon training"),
        ];
        index.rebuild(&clients).await.unwrap();

        let results = index.search("coach", "marathon", 10, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].client_id, "2");

        let results = index.search("coach", "ann", 10, 0).unwrap();
        assert_eq!(results[0].client_id, "1");
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_coach() {
        let temp_dir = TempDir::new().unwrap();
        let index = ClientSearchIndex::open(temp_dir.path()).unwrap();

        index
            .index_client(&create_test_client("1", "coach-a", "Ann", "Strength"))
            .await
            .unwrap();
        index
            .index_client(&create_test_client("2", "coach-b", "Ann", "Strength"))
            .await
            .unwrap();

        let results = index.search("coach-b", "ann", 10, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].client_id, "2");
    }

    #[tokio::test]
    async fn test_removed_client_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let index = ClientSearchIndex::open(temp_dir.path()).unwrap();

        index
            .index_client(&create_test_client("1", "coach", "Ann", "Mobility"))
            .await
            .unwrap();
        index.remove_client("1").await.unwrap();

        assert!(index.search("coach", "ann", 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_window_edges_return_empty() {
        let temp_dir = TempDir::new().unwrap();
        let index = ClientSearchIndex::open(temp_dir.path()).unwrap();
        index
            .index_client(&create_test_client("1", "coach", "Ann", "Mobility"))
            .await
            .unwrap();

        assert!(index.search("coach", "ann", 0, 0).unwrap().is_empty());
        assert!(index.search("coach", "ann", 20, usize::MAX).unwrap().is_empty());
        assert!(index.search("coach", "ann", usize::MAX, 0).unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = ClientSearchIndex::open(temp_dir.path()).unwrap();

        assert!(index.search("coach", "  ", 10, 0).unwrap().is_empty());
    }
}
