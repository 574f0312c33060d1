mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Clustering, Config, Context, Embedding, EmbeddingProviderConfig, Search, Store, Values,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.store.url.trim().is_empty() {
		return Err(Error::Validation { message: "store.url must be non-empty.".to_string() });
	}

	for (label, embedding) in
		[("embedding.semantic", &cfg.embedding.semantic), ("embedding.code", &cfg.embedding.code)]
	{
		if embedding.api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("{label}.api_base must be non-empty."),
			});
		}
		if !embedding.path.starts_with('/') {
			return Err(Error::Validation {
				message: format!("{label}.path must start with a slash."),
			});
		}
		if embedding.model.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label}.model must be non-empty.") });
		}
		if embedding.dimensions == 0 {
			return Err(Error::Validation {
				message: format!("{label}.dimensions must be greater than zero."),
			});
		}
		if embedding.timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("{label}.timeout_ms must be greater than zero."),
			});
		}
	}

	if cfg.search.keyword_scroll_limit == 0 {
		return Err(Error::Validation {
			message: "search.keyword_scroll_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.hybrid_boost.is_finite() {
		return Err(Error::Validation {
			message: "search.hybrid_boost must be a finite number.".to_string(),
		});
	}
	if cfg.search.hybrid_boost < 0.0 {
		return Err(Error::Validation {
			message: "search.hybrid_boost must be zero or greater.".to_string(),
		});
	}

	if cfg.context.default_limit == 0 {
		return Err(Error::Validation {
			message: "context.default_limit must be greater than zero.".to_string(),
		});
	}

	for (label, max_tokens) in [
		("context.default_max_tokens", cfg.context.default_max_tokens),
		("context.premortem_max_tokens", cfg.context.premortem_max_tokens),
	] {
		if max_tokens == 0 || max_tokens > 100_000 {
			return Err(Error::Validation {
				message: format!("{label} must be between 1 and 100000."),
			});
		}
	}

	if cfg.context.values_limit == 0 {
		return Err(Error::Validation {
			message: "context.values_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.context.source_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "context.source_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.context.premortem_limit == 0 {
		return Err(Error::Validation {
			message: "context.premortem_limit must be greater than zero.".to_string(),
		});
	}

	if cfg.clustering.min_cluster_size < 2 {
		return Err(Error::Validation {
			message: "clustering.min_cluster_size must be at least 2.".to_string(),
		});
	}
	if cfg.clustering.min_samples == 0 {
		return Err(Error::Validation {
			message: "clustering.min_samples must be greater than zero.".to_string(),
		});
	}
	if cfg.clustering.min_experiences < cfg.clustering.min_cluster_size {
		return Err(Error::Validation {
			message: "clustering.min_experiences must be at least clustering.min_cluster_size."
				.to_string(),
		});
	}
	if cfg.clustering.scroll_limit == 0 {
		return Err(Error::Validation {
			message: "clustering.scroll_limit must be greater than zero.".to_string(),
		});
	}

	if cfg.values.min_members == 0 {
		return Err(Error::Validation {
			message: "values.min_members must be greater than zero.".to_string(),
		});
	}
	if !cfg.values.min_similarity.is_finite() || !(0.0..=1.0).contains(&cfg.values.min_similarity) {
		return Err(Error::Validation {
			message: "values.min_similarity must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.values.scroll_limit == 0 {
		return Err(Error::Validation {
			message: "values.scroll_limit must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.store.url = cfg.store.url.trim().trim_end_matches('/').to_string();

	for embedding in [&mut cfg.embedding.semantic, &mut cfg.embedding.code] {
		embedding.api_base = embedding.api_base.trim().trim_end_matches('/').to_string();

		if embedding.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
			embedding.api_key = None;
		}
	}
}
