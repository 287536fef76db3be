use time::OffsetDateTime;
use uuid::Uuid;

use statdoc_domain::{
	SourceDocument, SourceOrigin,
	source::{content_hash, normalize_text},
};

use crate::{Error, Result, db::Db, models::CorpusDocRow};

/// Loads the whole registry as a retrieval snapshot, in stable order. A job
/// re-running against an unchanged registry sees an identical corpus.
pub async fn load_corpus(db: &Db) -> Result<Vec<SourceDocument>> {
	let rows = sqlx::query_as::<_, CorpusDocRow>(
		"SELECT * FROM corpus_documents ORDER BY doc_id ASC",
	)
	.fetch_all(&db.pool)
	.await?;
	let mut out = Vec::with_capacity(rows.len());

	for row in rows {
		let origin = SourceOrigin::parse(&row.origin).ok_or_else(|| {
			Error::InvalidArgument(format!("Unknown source origin {:?}.", row.origin))
		})?;

		out.push(SourceDocument {
			doc_id: row.doc_id,
			origin,
			title: row.title,
			url: row.url,
			external_ref: row.external_ref,
			tier: row.tier,
			published_at: row.published_at,
			raw_hash: row.raw_hash,
			text_hash: row.text_hash,
			text: row.text,
		});
	}

	Ok(out)
}

pub struct IngestDocument<'a> {
	pub origin: SourceOrigin,
	pub title: &'a str,
	pub url: Option<&'a str>,
	pub external_ref: Option<&'a str>,
	pub tier: &'a str,
	pub published_at: Option<OffsetDateTime>,
	pub raw_text: &'a str,
}

/// Registers one document. Content identity is the hash of the normalized
/// text; re-ingesting identical material is a no-op returning the existing
/// id.
pub async fn ingest_document(db: &Db, doc: &IngestDocument<'_>) -> Result<Uuid> {
	if doc.title.trim().is_empty() {
		return Err(Error::InvalidArgument("Document title must be non-empty.".to_string()));
	}

	let text = normalize_text(doc.raw_text);

	if text.is_empty() {
		return Err(Error::InvalidArgument("Document text must be non-empty.".to_string()));
	}

	let raw_hash = content_hash(doc.raw_text.as_bytes());
	let text_hash = content_hash(text.as_bytes());
	let existing: Option<(Uuid,)> =
		sqlx::query_as("SELECT doc_id FROM corpus_documents WHERE text_hash = $1")
			.bind(text_hash.as_str())
			.fetch_optional(&db.pool)
			.await?;

	if let Some((doc_id,)) = existing {
		return Ok(doc_id);
	}

	let doc_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO corpus_documents (
	doc_id, origin, title, url, external_ref, tier, published_at, raw_hash, text_hash, text
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (text_hash) DO NOTHING",
	)
	.bind(doc_id)
	.bind(doc.origin.as_str())
	.bind(doc.title.trim())
	.bind(doc.url)
	.bind(doc.external_ref)
	.bind(doc.tier)
	.bind(doc.published_at)
	.bind(raw_hash.as_str())
	.bind(text_hash.as_str())
	.bind(text.as_str())
	.execute(&db.pool)
	.await?;

	// A concurrent ingest of the same material may have won the conflict.
	let row: (Uuid,) = sqlx::query_as("SELECT doc_id FROM corpus_documents WHERE text_hash = $1")
		.bind(text_hash.as_str())
		.fetch_one(&db.pool)
		.await?;

	Ok(row.0)
}
