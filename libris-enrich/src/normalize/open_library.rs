//! Open Library payload normalization

use super::{clean, dedup_ordered, score_work};
use crate::providers::open_library::{OlDoc, OlSearchResponse};
use libris_common::model::{Author, Edition, ProviderName, Work};

const COVERS_BASE_URL: &str = "https://covers.openlibrary.org/b/id";

/// Normalize a search response into canonical works
pub fn normalize(response: &OlSearchResponse, limit: usize) -> Vec<Work> {
    response
        .docs
        .iter()
        .take(limit)
        .map(normalize_doc)
        .collect()
}

fn normalize_doc(doc: &OlDoc) -> Work {
    let mut work = Work::new(doc.title.clone(), ProviderName::OpenLibrary);

    work.first_publication_year = doc.first_publish_year;
    work.description = clean(doc.first_sentences.first().map(String::as_str));
    work.subject_tags = dedup_ordered(doc.subjects.iter().cloned());
    work.original_language = clean(doc.languages.first().map(String::as_str));
    work.authors = doc
        .author_names
        .iter()
        .filter_map(|name| clean(Some(name)).map(Author::new))
        .collect();

    if let Some(key) = clean(doc.key.as_deref()) {
        work.provider_ids.insert(ProviderName::OpenLibrary, key);
    }

    let mut edition = Edition {
        title: work.title.clone(),
        publisher: clean(doc.publishers.first().map(String::as_str)),
        publication_date: clean(doc.publish_dates.first().map(String::as_str)),
        page_count: doc.number_of_pages_median,
        language: work.original_language.clone(),
        cover_image_url: doc
            .cover_id
            .map(|id| format!("{COVERS_BASE_URL}/{id}-L.jpg")),
        ..Edition::default()
    };
    edition.set_isbns(doc.isbns.iter().cloned());
    work.editions.push(edition);

    let score = score_work(&work);
    work.set_quality_score(score as i32);
    work
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_common::model::BookFormat;

    fn sample_doc() -> OlDoc {
        OlDoc {
            key: Some("/works/OL82563W".to_string()),
            title: Some("Harry Potter and the Sorcerer's Stone".to_string()),
            author_names: vec!["J. K. Rowling".to_string()],
            first_publish_year: Some(1997),
            isbns: vec!["0439708184".to_string(), "9780439708180".to_string()],
            publishers: vec!["Scholastic".to_string()],
            publish_dates: vec!["1998-09-01".to_string()],
            languages: vec!["eng".to_string()],
            subjects: vec!["Wizards".to_string(), "Magic".to_string(), "wizards".to_string()],
            number_of_pages_median: Some(309),
            cover_id: Some(10521270),
            first_sentences: vec![
                "Mr. and Mrs. Dursley, of number four, Privet Drive, were proud to say that they were perfectly normal, thank you very much.".to_string(),
            ],
        }
    }

    #[test]
    fn test_normalize_full_doc() {
        let response = OlSearchResponse {
            num_found: 1,
            docs: vec![sample_doc()],
        };
        let works = normalize(&response, 20);
        assert_eq!(works.len(), 1);

        let work = &works[0];
        assert_eq!(work.title, "Harry Potter and the Sorcerer's Stone");
        assert_eq!(work.first_publication_year, Some(1997));
        assert_eq!(work.primary_provider, ProviderName::OpenLibrary);
        assert_eq!(work.subject_tags, vec!["Wizards", "Magic"]);
        assert_eq!(work.authors[0].name, "J. K. Rowling");

        let edition = &work.editions[0];
        // ISBN-13 preferred as primary
        assert_eq!(edition.isbn.as_deref(), Some("9780439708180"));
        assert!(edition.isbns.contains(&"0439708184".to_string()));
        assert_eq!(edition.publisher.as_deref(), Some("Scholastic"));
        assert_eq!(edition.format, BookFormat::Paperback);
        assert_eq!(
            edition.cover_image_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/10521270-L.jpg")
        );
        assert!(work.quality_score >= 80);
    }

    #[test]
    fn test_normalize_is_pure() {
        let response = OlSearchResponse {
            num_found: 1,
            docs: vec![sample_doc()],
        };
        assert_eq!(normalize(&response, 20), normalize(&response, 20));
    }

    #[test]
    fn test_missing_title_becomes_sentinel() {
        let response = OlSearchResponse {
            num_found: 1,
            docs: vec![OlDoc::default()],
        };
        let works = normalize(&response, 20);
        assert_eq!(works[0].title, "Unknown");
        assert!(works[0].editions[0].isbn.is_none());
    }

    #[test]
    fn test_limit_applies() {
        let response = OlSearchResponse {
            num_found: 3,
            docs: vec![sample_doc(), sample_doc(), sample_doc()],
        };
        assert_eq!(normalize(&response, 2).len(), 2);
    }
}
