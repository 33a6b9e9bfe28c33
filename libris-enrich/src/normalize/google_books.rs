//! Google Books payload normalization

use super::{clean, dedup_ordered, score_work};
use crate::providers::google_books::{GbVolume, GbVolumesResponse};
use libris_common::model::{extract_year, Author, Edition, ProviderName, Work};

/// Normalize a volume list into canonical works
pub fn normalize(response: &GbVolumesResponse) -> Vec<Work> {
    response.items.iter().map(normalize_volume).collect()
}

fn normalize_volume(volume: &GbVolume) -> Work {
    let info = &volume.volume_info;
    let mut work = Work::new(info.title.clone(), ProviderName::GoogleBooks);

    work.first_publication_year = info
        .published_date
        .as_deref()
        .and_then(extract_year);
    work.description = clean(info.description.as_deref());
    work.subject_tags = dedup_ordered(info.categories.iter().cloned());
    work.original_language = clean(info.language.as_deref());
    work.authors = info
        .authors
        .iter()
        .filter_map(|name| clean(Some(name)).map(Author::new))
        .collect();
    work.provider_ids
        .insert(ProviderName::GoogleBooks, volume.id.clone());

    let edition_title = clean(info.subtitle.as_deref())
        .map(|subtitle| format!("{}: {}", work.title, subtitle))
        .filter(|full| *full != work.title);

    let mut edition = Edition {
        title: work.title.clone(),
        edition_title,
        publisher: clean(info.publisher.as_deref()),
        publication_date: clean(info.published_date.as_deref()),
        page_count: info.page_count,
        language: work.original_language.clone(),
        cover_image_url: info
            .image_links
            .as_ref()
            .and_then(|links| clean(links.thumbnail.as_deref())),
        ..Edition::default()
    };

    // ISBN-13 identifiers first so primary selection prefers them
    let mut isbns: Vec<String> = Vec::new();
    for id in &info.industry_identifiers {
        if id.identifier_type == "ISBN_13" {
            isbns.push(id.identifier.clone());
        }
    }
    for id in &info.industry_identifiers {
        if id.identifier_type == "ISBN_10" {
            isbns.push(id.identifier.clone());
        }
    }
    edition.set_isbns(isbns);
    work.editions.push(edition);

    let score = score_work(&work);
    work.set_quality_score(score as i32);
    work
}
