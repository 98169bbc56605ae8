use page_view::nav::{next_page, NavLinks};
use page_view::phpbb;
use scraper::Html;
use url::Url;

const TOPIC_PAGE: &str = r#"
<!DOCTYPE html>
<html>
<head><title>Welcome thread | Forum</title></head>
<body>
    <h1 class="p-title">Welcome thread</h1>

    <article class="message message--post">
        <header class="message-attribution">
            <time datetime="2024-03-01T09:00:00+0000">Mar 1, 2024</time>
        </header>
        <div class="message-body">
            <div class="bbWrapper">Hello everyone, photos below.</div>
        </div>
        <section class="message-attachments">
            <ul>
                <li class="attachment">
                    <a class="attachment-icon" href="/attachments/lake-jpg.101/"><img src="/data/thumb/101.jpg"></a>
                    <div class="attachment-name"><a href="/attachments/lake-jpg.101/">lake.jpg</a></div>
                </li>
                <li class="attachment">
                    <div class="attachment-name"><a href="/attachments/notes-pdf.102/">notes.pdf</a></div>
                </li>
            </ul>
        </section>
    </article>

    <article class="message message--post">
        <header class="message-attribution">
            <time datetime="2024-03-02T18:30:00+0000">Mar 2, 2024</time>
        </header>
        <div class="message-body">
            <div class="bbWrapper">Nice. Here is the clip.</div>
            <div class="bbMediaWrapper">
                <video controls><source src="/data/video/7.mp4" type="video/mp4"></video>
            </div>
        </div>
    </article>

    <nav class="pageNav">
        <a class="pageNav-jump pageNav-jump--prev" href="/threads/welcome.12/">Prev</a>
        <ul class="pageNav-main">
            <li class="pageNav-page"><a href="/threads/welcome.12/">1</a></li>
            <li class="pageNav-page pageNav-page--current"><a href="/threads/welcome.12/page-2">2</a></li>
            <li class="pageNav-page"><a href="/threads/welcome.12/page-3">3</a></li>
        </ul>
        <a class="pageNav-jump pageNav-jump--next" href="/threads/welcome.12/page-3">Next</a>
    </nav>
</body>
</html>
"#;

fn base() -> Url {
    Url::parse("https://forum.example/threads/welcome.12/page-2").unwrap()
}

#[test]
fn test_topic_posts() {
    let document = Html::parse_document(TOPIC_PAGE);
    let page = phpbb::topic().unwrap();
    let resolved = page.resolve(&document);

    assert_eq!(resolved.text("title"), Some("Welcome thread"));

    let posts = resolved.group("posts");
    assert_eq!(posts.len(), 2);

    let first = posts[0].view().unwrap();
    assert_eq!(first.attr("time", "datetime"), Some("2024-03-01T09:00:00+0000"));
    assert_eq!(first.group("body").len(), 1);
    assert_eq!(first.group("body")[0].text(), Some("Hello everyone, photos below."));
    assert!(first.group("videos").is_empty());

    let attachments = first.group("attachments");
    assert_eq!(attachments.len(), 2);
    let lake = attachments[0].view().unwrap();
    assert_eq!(lake.text("filename"), Some("lake.jpg"));
    assert_eq!(lake.attr("download", "href"), Some("/attachments/lake-jpg.101/"));
    assert!(lake.value("preview").is_some());
    let notes = attachments[1].view().unwrap();
    assert_eq!(notes.text("filename"), Some("notes.pdf"));
    assert!(notes.get("preview").unwrap().is_absent());

    let second = posts[1].view().unwrap();
    assert!(second.group("attachments").is_empty());
    let videos = second.group("videos");
    assert_eq!(videos.len(), 1);
    assert_eq!(
        videos[0].view().unwrap().attr("source", "src"),
        Some("/data/video/7.mp4")
    );

    assert!(resolved.errors().is_empty());
}

#[test]
fn test_topic_pagination() {
    let document = Html::parse_document(TOPIC_PAGE);
    let page = phpbb::topic().unwrap();
    let resolved = page.resolve(&document);

    let links = NavLinks::from_view(resolved.view("nav").unwrap(), &base());
    assert_eq!(links.first.unwrap().as_str(), "https://forum.example/threads/welcome.12/");
    assert_eq!(links.last.unwrap().as_str(), "https://forum.example/threads/welcome.12/page-3");
    assert_eq!(
        next_page(&resolved, "nav", &base()).unwrap().as_str(),
        "https://forum.example/threads/welcome.12/page-3"
    );
}

#[test]
fn test_topic_json() {
    let extraction = phpbb::topic().unwrap().extract(TOPIC_PAGE);
    assert!(extraction.errors.is_empty());

    let data = &extraction.data;
    let keys: Vec<&String> = data.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["title", "posts", "nav"]);
    assert_eq!(data["posts"][0]["attachments"][1]["filename"]["text"], "notes.pdf");
    assert!(data["posts"][0]["attachments"][1]["preview"].is_null());
    assert_eq!(data["posts"][1]["videos"][0]["source"]["attrs"]["type"], "video/mp4");
}
