//! Forum page declarations
//!
//! Pages of the forum this crate was built to scrape. Views take their anchor
//! selector from the declaring parent, so the same view can be reused under a
//! different container.

use crate::dom::Selector;
use crate::error::SchemaError;
use crate::view::{Field, Group, Page, View};

/// Login form
pub fn login() -> Result<Page, SchemaError> {
    Ok(Page::new()
        .with("username", Field::css("input[name=login]")?)
        .with("password", Field::css("input[name=password]")?)
        .with("submit", Field::xpath(".//button[span[text() = 'Log in']]")?))
}

/// Forum index
pub fn index() -> Result<Page, SchemaError> {
    Ok(Page::new().with("threads", Group::new(forum_item(Selector::css(".node-body")?)?)))
}

pub fn forum_item(selector: Selector) -> Result<View, SchemaError> {
    Ok(View::new(selector)
        .with("title", Field::css(".node-main .node-title a")?)
        .with("time", Field::css(".node-extra time")?))
}

/// Topic listing of one forum
pub fn forum() -> Result<Page, SchemaError> {
    Ok(Page::new()
        .with("title", Field::css(".p-title")?)
        .with(
            "topics",
            Group::new(topic_item(Selector::css(".js-threadList .structItem")?)?),
        )
        .with("nav", nav(Selector::css(".pageNav")?)?))
}

pub fn topic_item(selector: Selector) -> Result<View, SchemaError> {
    Ok(View::new(selector)
        .with("title", Field::css(".structItem-title a:not(.labelLink)")?)
        .with("time", Field::css(".structItem-cell--latest time")?))
}

/// Posts of one topic
pub fn topic() -> Result<Page, SchemaError> {
    Ok(Page::new()
        .with("title", Field::css(".p-title")?)
        .with("posts", Group::new(post(Selector::css(".message--post")?)?))
        .with("nav", nav(Selector::css(".pageNav")?)?))
}

pub fn post(selector: Selector) -> Result<View, SchemaError> {
    Ok(View::new(selector)
        .with("time", Field::css(".message-attribution time")?)
        .with("body", Group::new(Field::css(".message-body")?))
        .with(
            "attachments",
            Group::new(attachment(Selector::css(".message-attachments .attachment")?)?),
        )
        .with(
            "videos",
            Group::new(video(Selector::css(".message-body .bbMediaWrapper video")?)?),
        ))
}

pub fn attachment(selector: Selector) -> Result<View, SchemaError> {
    Ok(View::new(selector)
        .with("filename", Field::css(".attachment-name")?)
        .with("download", Field::css(".attachment-name a")?)
        .with("preview", Field::css(".attachment-icon")?))
}

pub fn video(selector: Selector) -> Result<View, SchemaError> {
    Ok(View::new(selector).with("source", Field::tag("source")?))
}

/// Pagination; read with [`crate::nav::NavLinks`]
pub fn nav(selector: Selector) -> Result<View, SchemaError> {
    Ok(View::new(selector)
        .with("first", Field::css(".pageNav-page:first-of-type a")?)
        .with("prev", Field::css("a.pageNav-jump.pageNav-jump--prev")?)
        .with("next", Field::css("a.pageNav-jump.pageNav-jump--next")?)
        .with("last", Field::css(".pageNav-page:last-of-type a")?))
}
