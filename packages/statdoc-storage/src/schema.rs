pub fn render_schema() -> String {
	let init = include_str!("../../../sql/init.sql");

	expand_includes(init)
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_jobs.sql" => out.push_str(include_str!("../../../sql/tables/001_jobs.sql")),
				"tables/002_corpus_documents.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_corpus_documents.sql")),
				"tables/003_job_sources.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_job_sources.sql")),
				"tables/004_job_iterations.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_job_iterations.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_includes_every_table() {
		let schema = render_schema();

		for table in ["jobs", "corpus_documents", "job_sources", "job_iterations"] {
			assert!(
				schema.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
				"schema missing table {table}"
			);
		}

		assert!(!schema.contains("\\ir "), "unexpanded include directive left in schema");
	}
}
