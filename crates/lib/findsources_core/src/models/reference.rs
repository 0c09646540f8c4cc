//! Reference domain models: a cited event and the books it appears in.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::FilterOption;

/// Author id that references are reassigned to when their author's
/// account is deleted.
pub const ORPHAN_AUTHOR_ID: &str = "orphan";

/// Reference category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Arts,
    Business,
    ComputerScience,
    FoodDrinks,
    Health,
    History,
    Literature,
    Sciences,
    SocialSciences,
    Sports,
    Technology,
    Travel,
    Other,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::Arts,
        Category::Business,
        Category::ComputerScience,
        Category::FoodDrinks,
        Category::Health,
        Category::History,
        Category::Literature,
        Category::Sciences,
        Category::SocialSciences,
        Category::Sports,
        Category::Technology,
        Category::Travel,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Arts => "arts",
            Category::Business => "business",
            Category::ComputerScience => "computer_science",
            Category::FoodDrinks => "food_drinks",
            Category::Health => "health",
            Category::History => "history",
            Category::Literature => "literature",
            Category::Sciences => "sciences",
            Category::SocialSciences => "social_sciences",
            Category::Sports => "sports",
            Category::Technology => "technology",
            Category::Travel => "travel",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shop a book link points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookLinkType {
    #[serde(rename = "amazon")]
    Amazon,
    #[serde(rename = "bookdepository")]
    BookDepository,
    #[serde(rename = "waterstones")]
    Waterstones,
}

impl BookLinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookLinkType::Amazon => "amazon",
            BookLinkType::BookDepository => "bookdepository",
            BookLinkType::Waterstones => "waterstones",
        }
    }
}

impl FromStr for BookLinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amazon" => Ok(BookLinkType::Amazon),
            "bookdepository" => Ok(BookLinkType::BookDepository),
            "waterstones" => Ok(BookLinkType::Waterstones),
            other => Err(format!("unknown link type '{other}'")),
        }
    }
}

/// Page range of a book where the reference is found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSection {
    pub starting_page: u32,
    pub ending_page: u32,
}

/// Affiliate link for a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLink {
    pub link_type: BookLinkType,
    pub link_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub name: String,
    pub author: String,
    pub book_sections: Vec<BookSection>,
    #[serde(default)]
    pub book_links: Vec<BookLink>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub positive: u32,
    pub negative: u32,
}

/// A reference of an event, as submitted by an author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Assigned by the server on insert; ignored if a client sends one.
    #[serde(default)]
    pub reference_id: Option<String>,
    pub title: String,
    pub category: Category,
    pub description: String,
    pub books: Vec<Book>,
    #[serde(default)]
    pub rating: Option<Rating>,
}

/// Server-side metadata kept alongside each stored reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMetadata {
    pub created_at: DateTime<Utc>,
    pub author_id: String,
}

/// A reference as held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReference {
    pub reference: Reference,
    pub metadata: ReferenceMetadata,
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(format!("{field} must be between {min} and {max} characters"));
    }
    Ok(())
}

impl Reference {
    /// Check field limits. Returns a message naming the first violation.
    pub fn validate(&self) -> Result<(), String> {
        check_len("title", &self.title, 5, 100)?;
        check_len("description", &self.description, 30, 600)?;
        if self.books.is_empty() || self.books.len() > 50 {
            return Err("a reference must list between 1 and 50 books".into());
        }
        for book in &self.books {
            check_len("book name", &book.name, 5, 100)?;
            check_len("book author", &book.author, 5, 50)?;
            if book.book_sections.is_empty() || book.book_sections.len() > 100 {
                return Err(format!(
                    "book '{}' must list between 1 and 100 sections",
                    book.name
                ));
            }
            for section in &book.book_sections {
                let pages = 1..=9999;
                if !pages.contains(&section.starting_page) || !pages.contains(&section.ending_page)
                {
                    return Err(format!("book '{}' has a page outside 1-9999", book.name));
                }
                if section.starting_page > section.ending_page {
                    return Err(format!(
                        "book '{}' has a section ending before it starts",
                        book.name
                    ));
                }
            }
        }
        Ok(())
    }

    /// Whether any book carries a link of `link_type`.
    pub fn has_link(&self, link_type: BookLinkType) -> bool {
        self.books
            .iter()
            .flat_map(|b| b.book_links.iter())
            .any(|l| l.link_type == link_type)
    }

    /// Add, replace or (with an empty url) remove the `link_type` link on
    /// every book named `book_name`. Returns whether anything changed.
    pub fn set_book_link(&mut self, book_name: &str, link_type: BookLinkType, link_url: &str) -> bool {
        let mut changed = false;
        for book in self.books.iter_mut().filter(|b| b.name == book_name) {
            match book.book_links.iter().position(|l| l.link_type == link_type) {
                Some(i) if link_url.is_empty() => {
                    book.book_links.remove(i);
                    changed = true;
                }
                Some(i) => {
                    if book.book_links[i].link_url != link_url {
                        book.book_links[i].link_url = link_url.to_string();
                        changed = true;
                    }
                }
                None if link_url.is_empty() => {}
                None => {
                    book.book_links.push(BookLink {
                        link_type,
                        link_url: link_url.to_string(),
                    });
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Filter for the admin reference listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceFilter {
    pub has_amazon_links: FilterOption,
    pub has_waterstones_links: FilterOption,
    pub has_bookdepository_links: FilterOption,
}

impl ReferenceFilter {
    /// Each constrained link type paired with whether it must be present.
    pub fn constraints(&self) -> Vec<(BookLinkType, bool)> {
        [
            (BookLinkType::Amazon, self.has_amazon_links),
            (BookLinkType::Waterstones, self.has_waterstones_links),
            (BookLinkType::BookDepository, self.has_bookdepository_links),
        ]
        .into_iter()
        .filter_map(|(t, f)| f.as_bool().map(|want| (t, want)))
        .collect()
    }

    pub fn matches(&self, reference: &Reference) -> bool {
        self.constraints()
            .into_iter()
            .all(|(t, want)| reference.has_link(t) == want)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_reference() -> Reference {
        Reference {
            reference_id: None,
            title: "The fall of Constantinople".into(),
            category: Category::History,
            description: "An account of the final siege of the Byzantine capital in 1453.".into(),
            books: vec![Book {
                name: "Byzantium: The Decline".into(),
                author: "John Julius Norwich".into(),
                book_sections: vec![BookSection {
                    starting_page: 400,
                    ending_page: 412,
                }],
                book_links: vec![],
            }],
            rating: None,
        }
    }

    #[test]
    fn sample_reference_is_valid() {
        assert!(sample_reference().validate().is_ok());
    }

    #[test]
    fn short_title_is_rejected() {
        let mut r = sample_reference();
        r.title = "War".into();
        assert!(r.validate().unwrap_err().contains("title"));
    }

    #[test]
    fn inverted_section_is_rejected() {
        let mut r = sample_reference();
        r.books[0].book_sections[0] = BookSection {
            starting_page: 20,
            ending_page: 10,
        };
        assert!(r.validate().is_err());
    }

    #[test]
    fn no_books_is_rejected() {
        let mut r = sample_reference();
        r.books.clear();
        assert!(r.validate().is_err());
    }

    #[test]
    fn category_deserializes_snake_case() {
        let c: Category = serde_json::from_str("\"computer_science\"").unwrap();
        assert_eq!(c, Category::ComputerScience);
        assert_eq!(Category::FoodDrinks.to_string(), "food_drinks");
    }

    #[test]
    fn set_book_link_adds_replaces_and_removes() {
        let mut r = sample_reference();
        let name = r.books[0].name.clone();

        assert!(r.set_book_link(&name, BookLinkType::Amazon, "https://a/1"));
        assert!(r.has_link(BookLinkType::Amazon));

        assert!(r.set_book_link(&name, BookLinkType::Amazon, "https://a/2"));
        assert_eq!(r.books[0].book_links[0].link_url, "https://a/2");
        assert!(!r.set_book_link(&name, BookLinkType::Amazon, "https://a/2"));

        assert!(r.set_book_link(&name, BookLinkType::Amazon, ""));
        assert!(!r.has_link(BookLinkType::Amazon));

        assert!(!r.set_book_link("Unknown book", BookLinkType::Amazon, "https://a/3"));
    }

    #[test]
    fn reference_filter_checks_presence_and_absence() {
        let mut r = sample_reference();
        let name = r.books[0].name.clone();
        r.set_book_link(&name, BookLinkType::Waterstones, "https://w/1");

        let with_waterstones = ReferenceFilter {
            has_waterstones_links: FilterOption::Yes,
            ..Default::default()
        };
        let without_amazon = ReferenceFilter {
            has_amazon_links: FilterOption::No,
            ..Default::default()
        };
        let with_amazon = ReferenceFilter {
            has_amazon_links: FilterOption::Yes,
            ..Default::default()
        };
        assert!(with_waterstones.matches(&r));
        assert!(without_amazon.matches(&r));
        assert!(!with_amazon.matches(&r));
        assert!(ReferenceFilter::default().matches(&r));
    }
}
