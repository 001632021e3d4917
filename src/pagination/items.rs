//! Item-at-a-time traversal for blocking and async consumers.
//!
//! [`Traversal`] holds the cursor-advance state; [`Items`] and [`AsyncItems`] only differ in
//! how they wait for the next page. Pages are fetched lazily once the buffered items run out,
//! empty intermediate pages are skipped, and the first error ends the traversal.

// self
use crate::{
	_prelude::*,
	pagination::{Page, PagedQuery},
};

/// Boxed future returned by [`AsyncPageSource::fetch_page`].
pub type PageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<Page<T>>> + 'a + Send>>;

/// Blocking page fetcher.
pub trait PageSource {
	/// Fetches the page at the query's position.
	fn fetch_page<T>(&self, query: &PagedQuery) -> Result<Page<T>>
	where
		T: DeserializeOwned;
}

/// Async page fetcher.
pub trait AsyncPageSource {
	/// Fetches the page at the query's position.
	fn fetch_page<'a, T>(&'a self, query: &'a PagedQuery) -> PageFuture<'a, T>
	where
		T: 'a + Send + DeserializeOwned;
}

/// Scheduler-agnostic traversal state.
#[derive(Debug)]
pub struct Traversal<T> {
	base: PagedQuery,
	pending: Option<PagedQuery>,
	buffer: VecDeque<T>,
	pages: usize,
}
impl<T> Traversal<T> {
	/// Starts a fresh traversal at the query's position.
	pub fn new(query: PagedQuery) -> Self {
		Self { pending: Some(query.clone()), base: query, buffer: VecDeque::new(), pages: 0 }
	}

	/// Continues a traversal from an already fetched page.
	pub fn resume(query: PagedQuery, page: Page<T>) -> Result<Self> {
		let mut traversal =
			Self { pending: None, base: query, buffer: VecDeque::new(), pages: 0 };

		traversal.accept(page)?;

		Ok(traversal)
	}

	/// Next buffered item, if any.
	pub fn pop(&mut self) -> Option<T> {
		self.buffer.pop_front()
	}

	/// Query of the page to fetch once the buffer is drained; `None` at the end.
	pub fn pending(&self) -> Option<&PagedQuery> {
		self.pending.as_ref()
	}

	/// Number of pages accepted so far.
	pub fn pages(&self) -> usize {
		self.pages
	}

	/// Buffers a fetched page and advances the cursor.
	pub fn accept(&mut self, page: Page<T>) -> Result<()> {
		match page.next_query(&self.base) {
			Ok(next) => {
				self.pending = next;
				self.pages += 1;
				self.buffer.extend(page);

				Ok(())
			},
			Err(e) => {
				self.fail();

				Err(e.into())
			},
		}
	}

	/// Ends the traversal after an error.
	pub fn fail(&mut self) {
		self.pending = None;
		self.buffer.clear();
	}
}

/// Lazy blocking sequence of items across pages.
///
/// Not restartable: start a new traversal from a fresh [`PagedQuery`].
pub struct Items<'s, S, T> {
	source: &'s S,
	traversal: Traversal<T>,
}
impl<'s, S, T> Items<'s, S, T>
where
	S: PageSource,
	T: DeserializeOwned,
{
	/// Traverses from the query's position.
	pub fn new(source: &'s S, query: PagedQuery) -> Self {
		Self { source, traversal: Traversal::new(query) }
	}

	/// Continues from a page the caller already fetched.
	pub fn from_page(source: &'s S, query: PagedQuery, page: Page<T>) -> Result<Self> {
		Ok(Self { source, traversal: Traversal::resume(query, page)? })
	}

	/// Number of pages consumed so far.
	pub fn pages(&self) -> usize {
		self.traversal.pages()
	}
}
impl<S, T> Iterator for Items<'_, S, T>
where
	S: PageSource,
	T: DeserializeOwned,
{
	type Item = Result<T>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if let Some(item) = self.traversal.pop() {
				return Some(Ok(item));
			}

			let query = self.traversal.pending()?.clone();
			let accepted = match self.source.fetch_page(&query) {
				Ok(page) => self.traversal.accept(page),
				Err(e) => {
					self.traversal.fail();

					Err(e)
				},
			};

			if let Err(e) = accepted {
				return Some(Err(e));
			}
		}
	}
}
impl<S, T> Debug for Items<'_, S, T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Items").field("traversal", &self.traversal).finish_non_exhaustive()
	}
}

/// Lazy async sequence of items across pages; suspends only while fetching a page.
pub struct AsyncItems<'s, S, T> {
	source: &'s S,
	traversal: Traversal<T>,
}
impl<'s, S, T> AsyncItems<'s, S, T>
where
	S: AsyncPageSource,
	T: Send + DeserializeOwned,
{
	/// Traverses from the query's position.
	pub fn new(source: &'s S, query: PagedQuery) -> Self {
		Self { source, traversal: Traversal::new(query) }
	}

	/// Continues from a page the caller already fetched.
	pub fn from_page(source: &'s S, query: PagedQuery, page: Page<T>) -> Result<Self> {
		Ok(Self { source, traversal: Traversal::resume(query, page)? })
	}

	/// Number of pages consumed so far.
	pub fn pages(&self) -> usize {
		self.traversal.pages()
	}

	/// Returns the next item, fetching the following page when the buffer is drained.
	#[allow(clippy::should_implement_trait)]
	pub async fn next(&mut self) -> Option<Result<T>> {
		loop {
			if let Some(item) = self.traversal.pop() {
				return Some(Ok(item));
			}

			let query = self.traversal.pending()?.clone();
			let accepted = match self.source.fetch_page(&query).await {
				Ok(page) => self.traversal.accept(page),
				Err(e) => {
					self.traversal.fail();

					Err(e)
				},
			};

			if let Err(e) = accepted {
				return Some(Err(e));
			}
		}
	}

	/// Drains the remaining items into a vector, stopping at the first error.
	pub async fn try_collect(mut self) -> Result<Vec<T>> {
		let mut items = Vec::new();

		while let Some(item) = self.next().await {
			items.push(item?);
		}

		Ok(items)
	}
}
impl<S, T> Debug for AsyncItems<'_, S, T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AsyncItems").field("traversal", &self.traversal).finish_non_exhaustive()
	}
}
