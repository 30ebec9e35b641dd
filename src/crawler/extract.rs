//! Profile page extraction.
//!
//! Pure mapping from a page body to a [`CandidateRecord`]. Every field is
//! optional: markup that is missing leaves the field empty.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::crawler::record::CandidateRecord;

/// Title of the public listing page, which also renders as an `h3`
const LISTING_TITLE: &str = "İş axtaranlar";

const EDUCATION_SECTION: &str = "Təhsil";
const SKILLS_SECTION: &str = "Bacarıqlar";
const EXPERIENCE_SECTION: &str = "Təcrübə";

#[derive(Debug, Clone, Copy)]
enum InfoField {
    JobField,
    Experience,
    EducationLevel,
    MinSalary,
    Phone,
    Email,
}

/// Label substrings of the job-information blocks; first match wins
const INFO_LABELS: &[(&str, InfoField)] = &[
    ("İşləyəcəyi sahə", InfoField::JobField),
    ("Təcrübə", InfoField::Experience),
    ("Təhsil", InfoField::EducationLevel),
    ("Minimum əmək haqqı", InfoField::MinSalary),
    ("Əlaqə Telefonu", InfoField::Phone),
    ("Email", InfoField::Email),
];

struct Selectors {
    name_container: Selector,
    h3: Selector,
    avatar: Selector,
    img: Selector,
    info_block: Selector,
    h5: Selector,
    p: Selector,
    a: Selector,
    header: Selector,
    ability: Selector,
}

fn css(selector: &str) -> Selector {
    Selector::parse(selector).expect("selector literal is valid CSS")
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    name_container: css("div.jobsearcher-text"),
    h3: css("h3"),
    avatar: css("div.jobsearcher-avatar"),
    img: css("img"),
    info_block: css("div.job-information"),
    h5: css("h5"),
    p: css("p"),
    a: css("a"),
    header: css("header"),
    ability: css("div.jobsearcher-ability"),
});

/// Build the record for `candidate_id` from its profile page
pub fn extract(candidate_id: u32, body: &str) -> CandidateRecord {
    let document = Html::parse_document(body);
    let sel: &Selectors = &SELECTORS;

    let mut record = CandidateRecord::new(candidate_id);
    record.name = extract_name(&document, sel);
    record.profile_image = document
        .select(&sel.avatar)
        .next()
        .and_then(|avatar| avatar.select(&sel.img).next())
        .and_then(|img| img.value().attr("src"))
        .unwrap_or_default()
        .to_string();

    apply_info_blocks(&document, sel, &mut record);

    record.education_details = section(&document, sel, EDUCATION_SECTION)
        .and_then(|parent| first_text(parent, &sel.p))
        .unwrap_or_default();
    record.skills = section(&document, sel, SKILLS_SECTION)
        .and_then(|parent| parent.select(&sel.ability).next())
        .and_then(|ability| first_text(ability, &sel.p))
        .unwrap_or_default();
    record.work_experience = section(&document, sel, EXPERIENCE_SECTION)
        .and_then(|parent| first_text(parent, &sel.p))
        .unwrap_or_default();

    record
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().map(text_of)
}

/// Scoped to the profile header when present, otherwise the first real `h3`
fn extract_name(document: &Html, sel: &Selectors) -> String {
    if let Some(container) = document.select(&sel.name_container).next() {
        return first_text(container, &sel.h3).unwrap_or_default();
    }

    document
        .select(&sel.h3)
        .map(text_of)
        .find(|text| !text.is_empty() && !text.contains(LISTING_TITLE))
        .unwrap_or_default()
}

fn apply_info_blocks(document: &Html, sel: &Selectors, record: &mut CandidateRecord) {
    for block in document.select(&sel.info_block) {
        let (Some(heading), Some(paragraph)) =
            (block.select(&sel.h5).next(), block.select(&sel.p).next())
        else {
            continue;
        };

        let label = text_of(heading);
        let Some((_, field)) = INFO_LABELS.iter().find(|(needle, _)| label.contains(needle)) else {
            continue;
        };

        let value = text_of(paragraph);
        match field {
            InfoField::JobField => record.job_field = value,
            InfoField::Experience => record.experience = value,
            InfoField::EducationLevel => record.education_level = value,
            InfoField::MinSalary => record.min_salary = value,
            InfoField::Phone => record.phone = value,
            InfoField::Email => {
                if let Some(link) = block.select(&sel.a).next() {
                    record.email = text_of(link);
                }
            }
        }
    }
}

/// Parent of the first `header` whose text is exactly `title`
fn section<'a>(document: &'a Html, sel: &Selectors, title: &str) -> Option<ElementRef<'a>> {
    document
        .select(&sel.header)
        .find(|header| text_of(*header) == title)
        .and_then(|header| header.parent())
        .and_then(ElementRef::wrap)
}
