//! Pagination links
//!
//! A navigation view carries `first`, `prev`, `next` and `last` link fields.
//! Walking the pages is up to the fetch layer; it stops once `next` is gone.

use url::Url;

use crate::view::{ExtractedValue, ResolvedView};

/// Absolute targets of a resolved navigation view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavLinks {
    pub first: Option<Url>,
    pub prev: Option<Url>,
    pub next: Option<Url>,
    pub last: Option<Url>,
}

impl NavLinks {
    pub fn from_view(view: &ResolvedView<'_>, base: &Url) -> Self {
        let link = |name: &str| view.value(name).and_then(|value| resolve_href(value, base));
        Self {
            first: link("first"),
            prev: link("prev"),
            next: link("next"),
            last: link("last"),
        }
    }

    pub fn is_last_page(&self) -> bool {
        self.next.is_none()
    }
}

/// URL of the page after `page`, or `None` on the last page (or when the page
/// has no navigation view named `nav`)
pub fn next_page(page: &ResolvedView<'_>, nav: &str, base: &Url) -> Option<Url> {
    let view = page.view(nav)?;
    NavLinks::from_view(view, base).next
}

/// `href` of the element itself or of its first descendant anchor
fn resolve_href(value: &ExtractedValue<'_>, base: &Url) -> Option<Url> {
    let href = value.attr("href").or_else(|| {
        value
            .element()
            .descendants()
            .filter_map(scraper::ElementRef::wrap)
            .find_map(|el| el.value().attr("href"))
    })?;

    // Skip empty, javascript:, mailto:, tel:, and anchor links
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then_some(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{Field, Page, View};
    use scraper::Html;

    fn page() -> Page {
        Page::new().with(
            "nav",
            View::css(".pageNav")
                .unwrap()
                .with("first", Field::css(".pageNav-page:first-of-type a").unwrap())
                .with("prev", Field::css("a.pageNav-jump.pageNav-jump--prev").unwrap())
                .with("next", Field::css("a.pageNav-jump.pageNav-jump--next").unwrap())
                .with("last", Field::css(".pageNav-page:last-of-type").unwrap()),
        )
    }

    fn base() -> Url {
        Url::parse("https://forum.example/threads/welcome.12/page-2").unwrap()
    }

    #[test]
    fn test_middle_page() {
        let html = r#"
        <nav class="pageNav">
            <a class="pageNav-jump pageNav-jump--prev" href="page-1">Prev</a>
            <ul class="pageNav-main">
                <li class="pageNav-page"><a href="/threads/welcome.12/">1</a></li>
                <li class="pageNav-page"><a href="page-2">2</a></li>
                <li class="pageNav-page"><a href="page-3">3</a></li>
            </ul>
            <a class="pageNav-jump pageNav-jump--next" href="page-3">Next</a>
        </nav>
        "#;
        let document = Html::parse_document(html);
        let resolved = page().resolve(&document);

        let links = NavLinks::from_view(resolved.view("nav").unwrap(), &base());
        assert_eq!(links.first.unwrap().as_str(), "https://forum.example/threads/welcome.12/");
        assert_eq!(links.prev.unwrap().as_str(), "https://forum.example/threads/welcome.12/page-1");
        // `last` points at the <li>; its anchor supplies the href
        assert_eq!(links.last.unwrap().as_str(), "https://forum.example/threads/welcome.12/page-3");
        assert_eq!(
            next_page(&resolved, "nav", &base()).unwrap().as_str(),
            "https://forum.example/threads/welcome.12/page-3"
        );
    }

    #[test]
    fn test_last_page_has_no_next() {
        let html = r#"
        <nav class="pageNav">
            <a class="pageNav-jump pageNav-jump--prev" href="page-1">Prev</a>
            <ul><li class="pageNav-page"><a href="page-1">1</a></li></ul>
        </nav>
        "#;
        let document = Html::parse_document(html);
        let resolved = page().resolve(&document);

        let links = NavLinks::from_view(resolved.view("nav").unwrap(), &base());
        assert!(links.is_last_page());
        assert!(next_page(&resolved, "nav", &base()).is_none());
    }

    #[test]
    fn test_single_page_without_nav() {
        let document = Html::parse_document("<p>one page only</p>");
        let resolved = page().resolve(&document);
        assert!(next_page(&resolved, "nav", &base()).is_none());
    }

    #[test]
    fn test_unusable_hrefs_are_skipped() {
        let html = r#"
        <nav class="pageNav">
            <a class="pageNav-jump pageNav-jump--prev" href="javascript:void(0)">Prev</a>
            <a class="pageNav-jump pageNav-jump--next" href="mailto:admin@forum.example">Next</a>
        </nav>
        "#;
        let document = Html::parse_document(html);
        let resolved = page().resolve(&document);

        let links = NavLinks::from_view(resolved.view("nav").unwrap(), &base());
        assert_eq!(links, NavLinks::default());
    }
}
