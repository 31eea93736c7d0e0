use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::comments::Comment;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub by: String,
    #[serde(default)]
    pub descendants: i64,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl Story {
    pub fn discussion_url(&self) -> String {
        format!("https://news.ycombinator.com/item?id={}", self.id)
    }

    /// Article link, falling back to the HN discussion for text posts.
    pub fn link(&self) -> String {
        if self.url.trim().is_empty() {
            self.discussion_url()
        } else {
            self.url.clone()
        }
    }

    pub fn domain(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        let host = parsed.host_str()?;
        Some(host.trim_start_matches("www.").to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryThread {
    pub story: Story,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Default,
    Latest,
    Votes,
    Show,
}

pub const SORT_MODES: [SortMode; 4] = [
    SortMode::Default,
    SortMode::Latest,
    SortMode::Votes,
    SortMode::Show,
];

impl SortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Default => "default",
            SortMode::Latest => "latest",
            SortMode::Votes => "votes",
            SortMode::Show => "show",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortMode::Default => "Front Page",
            SortMode::Latest => "Latest",
            SortMode::Votes => "Top Voted",
            SortMode::Show => "Show HN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "default" | "front" => Some(SortMode::Default),
            "latest" | "new" => Some(SortMode::Latest),
            "votes" | "top" => Some(SortMode::Votes),
            "show" => Some(SortMode::Show),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoryQuery {
    pub sort: SortMode,
    pub topics: Vec<String>,
}

pub trait StoryService: Send + Sync {
    fn stories(&self, query: &StoryQuery, offset: usize, limit: usize) -> Result<Vec<Story>>;
    fn thread(&self, story_id: i64) -> Result<StoryThread>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: u64,
    pub offset: usize,
    pub limit: usize,
}

/// Offset pagination for the story list with at most one request in flight.
#[derive(Debug, Clone)]
pub struct StoryPager {
    page_size: usize,
    offset: usize,
    generation: u64,
    in_flight: bool,
    exhausted: bool,
}

impl StoryPager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            offset: 0,
            generation: 0,
            in_flight: false,
            exhausted: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Claims the next page, or `None` while one is in flight or the feed
    /// has ended.
    pub fn next_page(&mut self) -> Option<PageRequest> {
        if self.in_flight || self.exhausted {
            return None;
        }
        self.in_flight = true;
        Some(PageRequest {
            generation: self.generation,
            offset: self.offset,
            limit: self.page_size,
        })
    }

    /// Records a finished page. Returns false for pages of an older
    /// generation, which the caller must drop.
    pub fn complete(&mut self, generation: u64, received: usize) -> bool {
        if generation != self.generation {
            return false;
        }
        self.in_flight = false;
        self.offset += received;
        if received < self.page_size {
            self.exhausted = true;
        }
        true
    }

    pub fn fail(&mut self, generation: u64) {
        if generation == self.generation {
            self.in_flight = false;
        }
    }

    /// Starts over for a new query; anything in flight becomes stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.offset = 0;
        self.in_flight = false;
        self.exhausted = false;
    }
}

/// Built-in sample feed for `--demo` and for tests.
#[derive(Debug, Clone)]
pub struct DemoStoryService {
    stories: Vec<StoryThread>,
}

impl Default for DemoStoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoStoryService {
    pub fn new() -> Self {
        let now = Utc::now();
        let at = |minutes: i64| Some(now - ChronoDuration::minutes(minutes));
        let comment = |id: i64, story_id: i64, parent: Option<i64>, by: &str, text: &str, minutes| {
            Comment {
                id,
                story_id,
                parent_id: parent,
                author: by.to_string(),
                body: text.to_string(),
                timestamp: at(minutes),
            }
        };

        let stories = vec![
            StoryThread {
                story: Story {
                    id: 1001,
                    title: "Show HN: A keyboard-first Hacker News reader".into(),
                    url: "https://example.com/hn-station".into(),
                    score: 212,
                    by: "station".into(),
                    descendants: 6,
                    time: at(180),
                },
                comments: vec![
                    comment(1, 1001, None, "alice", "The j/k bindings feel right at home.", 170),
                    comment(2, 1001, Some(1), "bob", "Left collapses, right expands. Nice touch.", 160),
                    comment(3, 1001, Some(1), "carol", "Does it remember folds between stories?", 150),
                    comment(4, 1001, Some(2), "dave", "Ctrl+Left jumps back to the list.", 140),
                    comment(5, 1001, None, "erin", "Would love a topic filter in the sidebar.", 130),
                    comment(6, 1001, Some(5), "frank", "Press h from the list, then a to add one.", 120),
                ],
            },
            StoryThread {
                story: Story {
                    id: 1002,
                    title: "Postgres 17 released".into(),
                    url: "https://www.postgresql.org/about/news/".into(),
                    score: 540,
                    by: "pgfan".into(),
                    descendants: 3,
                    time: at(600),
                },
                comments: vec![
                    comment(11, 1002, None, "gina", "Incremental backup is the headline for me.", 590),
                    comment(12, 1002, Some(11), "hank", "Finally.", 580),
                    comment(13, 1002, None, "ivan", "JSON_TABLE support landed too.", 570),
                ],
            },
            StoryThread {
                story: Story {
                    id: 1003,
                    title: "Ask HN: How do you read long threads?".into(),
                    url: String::new(),
                    score: 48,
                    by: "curious".into(),
                    descendants: 0,
                    time: at(30),
                },
                comments: Vec::new(),
            },
        ];
        Self { stories }
    }

    fn matches(thread: &StoryThread, query: &StoryQuery) -> bool {
        if query.sort == SortMode::Show && !thread.story.title.starts_with("Show HN") {
            return false;
        }
        query.topics.is_empty()
            || query.topics.iter().any(|topic| {
                thread
                    .story
                    .title
                    .to_lowercase()
                    .contains(&topic.to_lowercase())
            })
    }
}

impl StoryService for DemoStoryService {
    fn stories(&self, query: &StoryQuery, offset: usize, limit: usize) -> Result<Vec<Story>> {
        let mut stories: Vec<Story> = self
            .stories
            .iter()
            .filter(|thread| Self::matches(thread, query))
            .map(|thread| thread.story.clone())
            .collect();
        match query.sort {
            SortMode::Latest => stories.sort_by(|a, b| b.time.cmp(&a.time)),
            SortMode::Votes => stories.sort_by(|a, b| b.score.cmp(&a.score)),
            SortMode::Default | SortMode::Show => {}
        }
        Ok(stories.into_iter().skip(offset).take(limit).collect())
    }

    fn thread(&self, story_id: i64) -> Result<StoryThread> {
        match self
            .stories
            .iter()
            .find(|thread| thread.story.id == story_id)
        {
            Some(thread) => Ok(thread.clone()),
            None => bail!("story {story_id} not found"),
        }
    }
}
