//! Cross-provider merge strategy
//!
//! Pure merge of normalized works from multiple providers. Editions are
//! deduplicated by primary ISBN (falling back to case-folded
//! title+author), the highest-quality provider wins each group, and its
//! missing fields are supplemented from the others.

use libris_common::model::{Author, Work};
use std::collections::HashMap;

/// Merge normalized provider results into one ranked list.
///
/// Input order is provider priority order; within a dedup group the
/// work with the highest quality score becomes the base record.
pub fn merge_works(provider_works: Vec<Vec<Work>>) -> Vec<Work> {
    let mut groups: Vec<Vec<Work>> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for works in provider_works {
        for work in works {
            let key = dedup_key(&work);
            match index_by_key.get(&key) {
                Some(&idx) => groups[idx].push(work),
                None => {
                    index_by_key.insert(key, groups.len());
                    groups.push(vec![work]);
                }
            }
        }
    }

    let mut merged: Vec<Work> = groups.into_iter().map(merge_group).collect();
    // Rank: best quality first; stable so provider priority breaks ties
    merged.sort_by(|a, b| b.quality_score.cmp(&a.quality_score));
    merged
}

fn dedup_key(work: &Work) -> String {
    work.editions
        .first()
        .map(|e| e.dedup_key(work.primary_author()))
        .unwrap_or_else(|| format!("ta:{}|", work.title.to_lowercase()))
}

/// Collapse one dedup group into a single work
fn merge_group(mut group: Vec<Work>) -> Work {
    // Highest quality becomes the base; input order breaks ties
    let base_idx = group
        .iter()
        .enumerate()
        .max_by(|(ai, a), (bi, b)| {
            a.quality_score
                .cmp(&b.quality_score)
                .then(bi.cmp(ai))
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut base = group.swap_remove(base_idx);

    for other in group {
        supplement(&mut base, other);
    }

    let score = crate::normalize::score_work(&base);
    base.set_quality_score(score as i32);
    base
}

/// Fill the base work's missing fields from another provider's record
fn supplement(base: &mut Work, other: Work) {
    if base.title == libris_common::model::UNKNOWN_TITLE
        && other.title != libris_common::model::UNKNOWN_TITLE
    {
        base.title = other.title.clone();
    }
    if base.description.is_none() {
        base.description = other.description;
    }
    if base.first_publication_year.is_none() {
        base.first_publication_year = other.first_publication_year;
    }
    if base.original_language.is_none() {
        base.original_language = other.original_language;
    }

    for tag in other.subject_tags {
        if !base
            .subject_tags
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&tag))
        {
            base.subject_tags.push(tag);
        }
    }

    base.authors = dedup_authors(std::mem::take(&mut base.authors), other.authors);

    for (provider, id) in other.provider_ids {
        base.provider_ids.entry(provider).or_insert(id);
    }
    for contributor in other.contributors {
        if !base.contributors.contains(&contributor) {
            base.contributors.push(contributor);
        }
    }

    // Edition-level supplementation against the base's first edition
    if let (Some(base_edition), Some(other_edition)) =
        (base.editions.first_mut(), other.editions.into_iter().next())
    {
        if base_edition.publisher.is_none() {
            base_edition.publisher = other_edition.publisher;
        }
        if base_edition.publication_date.is_none() {
            base_edition.publication_date = other_edition.publication_date;
        }
        if base_edition.page_count.is_none() {
            base_edition.page_count = other_edition.page_count;
        }
        if base_edition.cover_image_url.is_none() {
            base_edition.cover_image_url = other_edition.cover_image_url;
        }
        if base_edition.language.is_none() {
            base_edition.language = other_edition.language;
        }
        if base_edition.edition_title.is_none() {
            base_edition.edition_title = other_edition.edition_title;
        }

        let mut isbns: Vec<String> = base_edition.isbns.clone();
        isbns.extend(other_edition.isbns);
        base_edition.set_isbns(isbns);
    }
}

/// Union two author lists, deduplicated by case-folded name
fn dedup_authors(base: Vec<Author>, other: Vec<Author>) -> Vec<Author> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for author in base.into_iter().chain(other) {
        if seen.insert(author.dedup_key()) {
            out.push(author);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_common::model::{Edition, ProviderName};

    fn work_with_isbn(title: &str, isbn: &str, provider: ProviderName, quality: i32) -> Work {
        let mut work = Work::new(Some(title.to_string()), provider);
        let mut edition = Edition {
            title: title.to_string(),
            ..Edition::default()
        };
        edition.set_isbns(vec![isbn]);
        work.editions.push(edition);
        work.set_quality_score(quality);
        work
    }

    #[test]
    fn test_duplicate_isbn_collapses_to_one_edition() {
        let a = work_with_isbn("Same Book", "9783333333333", ProviderName::OpenLibrary, 70);
        let b = work_with_isbn("Same Book", "9783333333333", ProviderName::OpenLibrary, 60);

        let merged = merge_works(vec![vec![a, b]]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_cross_provider_dedup_by_isbn() {
        let ol = work_with_isbn("Dune", "9780441013593", ProviderName::OpenLibrary, 60);
        let gb = work_with_isbn("Dune", "9780441013593", ProviderName::GoogleBooks, 75);

        let merged = merge_works(vec![vec![ol], vec![gb]]);
        assert_eq!(merged.len(), 1);
        // Higher quality provider wins the base record
        assert_eq!(merged[0].primary_provider, ProviderName::GoogleBooks);
        assert!(merged[0].contributors.contains(&ProviderName::OpenLibrary));
    }

    #[test]
    fn test_missing_fields_supplemented() {
        let mut base = work_with_isbn("Dune", "9780441013593", ProviderName::OpenLibrary, 80);
        base.editions[0].publisher = Some("Chilton".to_string());

        let mut other = work_with_isbn("Dune", "9780441013593", ProviderName::GoogleBooks, 55);
        other.description = Some("A stunning blend of adventure and mysticism.".to_string());
        other.editions[0].page_count = Some(412);
        other.editions[0].cover_image_url = Some("https://covers.example/dune.jpg".to_string());

        let merged = merge_works(vec![vec![base], vec![other]]);
        let work = &merged[0];
        assert_eq!(work.primary_provider, ProviderName::OpenLibrary);
        assert_eq!(work.editions[0].publisher.as_deref(), Some("Chilton"));
        assert_eq!(work.editions[0].page_count, Some(412));
        assert!(work.description.is_some());
        assert!(work.editions[0].cover_image_url.is_some());
    }

    #[test]
    fn test_dedup_without_isbn_uses_title_and_author() {
        let mut a = Work::new(Some("Nameless".to_string()), ProviderName::OpenLibrary);
        a.authors.push(Author::new("Jane Doe"));
        a.editions.push(Edition {
            title: "Nameless".to_string(),
            ..Edition::default()
        });

        let mut b = Work::new(Some("NAMELESS".to_string()), ProviderName::GoogleBooks);
        b.authors.push(Author::new("JANE DOE"));
        b.editions.push(Edition {
            title: "NAMELESS".to_string(),
            ..Edition::default()
        });

        // Different titles stay distinct
        let mut c = Work::new(Some("Other".to_string()), ProviderName::GoogleBooks);
        c.editions.push(Edition {
            title: "Other".to_string(),
            ..Edition::default()
        });

        let merged = merge_works(vec![vec![a], vec![b, c]]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_authors_dedup_case_folded() {
        let mut a = work_with_isbn("Dune", "9780441013593", ProviderName::OpenLibrary, 70);
        a.authors.push(Author::new("Frank Herbert"));
        let mut b = work_with_isbn("Dune", "9780441013593", ProviderName::GoogleBooks, 60);
        b.authors.push(Author::new("FRANK HERBERT"));
        b.authors.push(Author::new("Brian Herbert"));

        let merged = merge_works(vec![vec![a], vec![b]]);
        assert_eq!(merged[0].authors.len(), 2);
        assert_eq!(merged[0].authors[0].name, "Frank Herbert");
    }

    #[test]
    fn test_isbn_union_preserves_invariant() {
        let mut a = work_with_isbn("Dune", "9780441013593", ProviderName::OpenLibrary, 70);
        a.editions[0].set_isbns(vec!["9780441013593", "0441013597"]);
        let b = work_with_isbn("Dune", "9780441013593", ProviderName::GoogleBooks, 60);

        let merged = merge_works(vec![vec![a], vec![b]]);
        let edition = &merged[0].editions[0];
        assert!(edition.isbns.contains(&"0441013597".to_string()));
        let isbn = edition.isbn.clone().unwrap();
        assert!(edition.isbns.contains(&isbn));
        let unique: std::collections::HashSet<_> = edition.isbns.iter().collect();
        assert_eq!(unique.len(), edition.isbns.len());
    }

    #[test]
    fn test_ranking_by_quality() {
        let low = work_with_isbn("Low", "9781111111111", ProviderName::OpenLibrary, 55);
        let high = work_with_isbn("High", "9782222222222", ProviderName::OpenLibrary, 90);

        let merged = merge_works(vec![vec![low, high]]);
        assert_eq!(merged[0].title, "High");
    }
}
