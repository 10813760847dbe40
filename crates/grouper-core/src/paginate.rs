//! Bounded page iteration.
//!
//! `Pages` turns a "fetch page N" function into a lazy iterator. It stops at
//! the first empty page, at the first error, or after `cap` pages, whichever
//! comes first. `restart` rewinds to page 1 so the same listing can be read
//! again.

use crate::error::Result;

pub struct Pages<T, F>
where
    F: FnMut(u32) -> Result<Vec<T>>,
{
    fetch: F,
    next: u32,
    cap: u32,
    done: bool,
    label: String,
}

impl<T, F> Pages<T, F>
where
    F: FnMut(u32) -> Result<Vec<T>>,
{
    pub fn new(label: impl Into<String>, cap: u32, fetch: F) -> Self {
        Self {
            fetch,
            next: 1,
            cap,
            done: false,
            label: label.into(),
        }
    }

    pub fn restart(&mut self) {
        self.next = 1;
        self.done = false;
    }

    /// Number of the page the next call to `next()` would fetch.
    pub fn position(&self) -> u32 {
        self.next
    }

    /// Drain the remaining pages into one list, failing on the first error.
    /// After an error, `position` is the page that failed.
    pub fn collect_all(&mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for page in self.by_ref() {
            items.extend(page?);
        }
        Ok(items)
    }
}

impl<T, F> Iterator for Pages<T, F>
where
    F: FnMut(u32) -> Result<Vec<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.next > self.cap {
            self.done = true;
            tracing::warn!(
                "{}: stopped at page cap {} before an empty page",
                self.label,
                self.cap
            );
            return None;
        }
        match (self.fetch)(self.next) {
            Ok(page) if page.is_empty() => {
                self.done = true;
                None
            }
            Ok(page) => {
                self.next += 1;
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
