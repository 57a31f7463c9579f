//! Country tags: `TAG = "countries/Name.txt"` lines

use async_trait::async_trait;
use modpreview_loader::{
    Analysis, AnalysisInput, ContentAnalyzer, FileLoader, LoaderSession, Position, ProgressRelay, ResourceSource,
    Result, Warning,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::COUNTRY_TAGS_FILE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub tag: String,
    pub file: String,
}

fn is_valid_tag(tag: &str) -> bool {
    tag.len() == 3 && tag.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

pub fn parse_country_tags(resource: &str, text: &str) -> (Vec<Country>, Vec<Warning>) {
    let mut countries = Vec::new();
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let position = Position {
            line: index as u32 + 1,
            column: 1,
        };

        let Some((tag, file)) = line.split_once('=') else {
            warnings.push(Warning::new(resource, format!("Expected TAG = \"file\", found {:?}", line)).at(position));
            continue;
        };
        let (tag, file) = (tag.trim(), file.trim().trim_matches('"'));

        // Engine directive, not a country
        if tag == "dynamic_tags" {
            continue;
        }
        if !is_valid_tag(tag) {
            warnings.push(Warning::new(resource, format!("Invalid country tag {:?}", tag)).at(position));
            continue;
        }
        if !seen.insert(tag.to_string()) {
            warnings.push(Warning::new(resource, format!("Duplicate country tag {}", tag)).at(position));
            continue;
        }

        countries.push(Country {
            tag: tag.to_string(),
            file: format!("common/{}", file),
        });
    }

    (countries, warnings)
}

pub struct CountriesAnalyzer;

#[async_trait]
impl ContentAnalyzer for CountriesAnalyzer {
    type Output = Vec<Country>;

    fn name(&self) -> &'static str {
        "CountriesLoader"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<Vec<Country>>> {
        let (countries, warnings) = parse_country_tags(input.path, input.require_content()?);
        Ok(Analysis::new(countries).with_warnings(warnings))
    }
}

pub type CountriesLoader = FileLoader<CountriesAnalyzer>;

pub fn countries_loader(source: Arc<dyn ResourceSource>, progress: ProgressRelay) -> CountriesLoader {
    FileLoader::new(COUNTRY_TAGS_FILE, CountriesAnalyzer, source, progress)
}
