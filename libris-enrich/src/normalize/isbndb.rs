//! ISBNdb payload normalization

use super::{clean, dedup_ordered, score_work};
use crate::providers::isbndb::IsbndbBookResponse;
use libris_common::model::{extract_year, Author, BookFormat, Edition, ProviderName, Work};

/// Normalize a single-book lookup into a canonical work
pub fn normalize(response: &IsbndbBookResponse) -> Work {
    let book = &response.book;
    let mut work = Work::new(book.title.clone(), ProviderName::Isbndb);

    work.first_publication_year = book.date_published.as_deref().and_then(extract_year);
    work.description = clean(book.synopsis.as_deref());
    work.subject_tags = dedup_ordered(book.subjects.iter().cloned());
    work.original_language = clean(book.language.as_deref());
    work.authors = book
        .authors
        .iter()
        .filter_map(|name| clean(Some(name)).map(Author::new))
        .collect();

    if let Some(isbn13) = clean(book.isbn13.as_deref()) {
        work.provider_ids.insert(ProviderName::Isbndb, isbn13);
    }

    let edition_title = clean(book.title_long.as_deref()).filter(|long| *long != work.title);

    let mut edition = Edition {
        title: work.title.clone(),
        edition_title,
        publisher: clean(book.publisher.as_deref()),
        publication_date: clean(book.date_published.as_deref()),
        page_count: book.pages,
        format: book
            .binding
            .as_deref()
            .map(BookFormat::from_binding)
            .unwrap_or_default(),
        language: work.original_language.clone(),
        cover_image_url: clean(book.image.as_deref()),
        edition_description: None,
        ..Edition::default()
    };
    edition.set_isbns(
        [book.isbn13.clone(), book.isbn.clone()]
            .into_iter()
            .flatten(),
    );
    work.editions.push(edition);

    let score = score_work(&work);
    work.set_quality_score(score as i32);
    work
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::isbndb::IsbndbBook;

    fn sample_response() -> IsbndbBookResponse {
        IsbndbBookResponse {
            book: IsbndbBook {
                title: Some("Neuromancer".to_string()),
                title_long: Some("Neuromancer (Sprawl Trilogy, Book 1)".to_string()),
                authors: vec!["William Gibson".to_string()],
                publisher: Some("Ace Books".to_string()),
                date_published: Some("1984-07-01".to_string()),
                pages: Some(271),
                binding: Some("Mass Market Paperback".to_string()),
                image: Some("https://images.isbndb.com/covers/neuromancer-L.jpg".to_string()),
                synopsis: Some(
                    "Case was the sharpest data-thief in the matrix, until he crossed the wrong people."
                        .to_string(),
                ),
                subjects: vec!["Science fiction".to_string(), "Cyberpunk".to_string()],
                isbn: Some("0441569560".to_string()),
                isbn13: Some("9780441569564".to_string()),
                language: Some("en".to_string()),
            },
        }
    }

    #[test]
    fn test_normalize_book() {
        let work = normalize(&sample_response());

        assert_eq!(work.title, "Neuromancer");
        assert_eq!(work.first_publication_year, Some(1984));
        assert_eq!(work.primary_provider, ProviderName::Isbndb);

        let edition = &work.editions[0];
        assert_eq!(edition.isbn.as_deref(), Some("9780441569564"));
        assert_eq!(edition.format, BookFormat::Paperback);
        assert_eq!(
            edition.edition_title.as_deref(),
            Some("Neuromancer (Sprawl Trilogy, Book 1)")
        );
        // Cover + synopsis + pages + publisher + subjects + authors
        assert_eq!(work.quality_score, 100);
    }

    #[test]
    fn test_binding_mapping() {
        let mut response = sample_response();
        response.book.binding = Some("Kindle Edition".to_string());
        assert_eq!(normalize(&response).editions[0].format, BookFormat::Ebook);

        response.book.binding = Some("Unknown Format".to_string());
        assert_eq!(
            normalize(&response).editions[0].format,
            BookFormat::Paperback
        );

        response.book.binding = None;
        assert_eq!(
            normalize(&response).editions[0].format,
            BookFormat::Paperback
        );
    }

    #[test]
    fn test_identical_title_long_is_dropped() {
        let mut response = sample_response();
        response.book.title_long = Some("Neuromancer".to_string());
        let work = normalize(&response);
        assert!(work.editions[0].edition_title.is_none());
    }

    #[test]
    fn test_sparse_book_scores_low() {
        let response = IsbndbBookResponse {
            book: IsbndbBook {
                title: Some("Bare".to_string()),
                ..IsbndbBook::default()
            },
        };
        let work = normalize(&response);
        assert_eq!(work.quality_score, 50);
        assert!(work.editions[0].isbns.is_empty());
        assert!(work.editions[0].isbn.is_none());
    }
}
