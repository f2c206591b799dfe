//! Stream resources.
//!
//! A stream resource generalizes a file path: it can be opened for reading,
//! which yields the items of its backing store, or opened for writing, which
//! first clears the backing store and then accepts items one at a time.
//! The backing store may be a list, a string, a file or a spooled temporary
//! file. Callers only see the items.
//!
//! Each call to [`StreamResource::reading`] is an independent full pass over
//! the current contents. This is what lets the tabulator scan a large ballot
//! file once per round without keeping it in memory.
//!
//! ```
//! use irv_counting::streams::{ListResource, StreamResource};
//!
//! let mut resource = ListResource::new(vec![1u32, 2, 3]);
//! {
//!     let mut stream = resource.writing()?;
//!     stream.write(4)?;
//!     stream.finish()?;
//! }
//! let items: Vec<u32> = resource.reading()?.collect::<Result<_, _>>()?;
//! assert_eq!(items, vec![4]);
//! # Ok::<(), irv_counting::streams::StreamError>(())
//! ```

use std::fmt::Debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use snafu::{IntoError, ResultExt, Snafu};
use tempfile::SpooledTempFile;

/// In-memory size of a temporary resource before it rolls over to disk.
pub const DEFAULT_SPOOL_SIZE: usize = 1 << 20;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StreamError {
    #[snafu(display("{resource} is not available"))]
    Unavailable { resource: String, source: io::Error },
    #[snafu(display("{resource} does not allow writing"))]
    ReadOnly { resource: String },
    #[snafu(display("i/o failure on {resource}"))]
    Io { resource: String, source: io::Error },
    #[snafu(display("malformed {label} {line:?}: {reason}"))]
    Malformed {
        label: &'static str,
        line: String,
        reason: String,
    },
    #[snafu(display("the total weight of the {label}s does not fit in 64 bits"))]
    Overflow { label: &'static str },
    #[snafu(display("last read {label} of {resource}: number={number}, {last_item}"))]
    Read {
        resource: String,
        label: &'static str,
        number: usize,
        last_item: String,
        #[snafu(source(from(StreamError, Box::new)))]
        source: Box<StreamError>,
    },
    #[snafu(display("last written {label} of {resource}: number={number}, {last_item}"))]
    Write {
        resource: String,
        label: &'static str,
        number: usize,
        last_item: String,
        #[snafu(source(from(StreamError, Box::new)))]
        source: Box<StreamError>,
    },
}

impl StreamError {
    /// The error that caused this one, with the positional context removed.
    pub fn root(&self) -> &StreamError {
        match self {
            StreamError::Read { source, .. } | StreamError::Write { source, .. } => source.root(),
            other => other,
        }
    }

    /// True if the backing store could not be used at all.
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self.root(),
            StreamError::Unavailable { .. } | StreamError::ReadOnly { .. }
        )
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

/// The receiving end of a resource opened for writing.
pub trait ItemSink<T> {
    fn write_item(&mut self, item: T) -> StreamResult<()>;

    fn flush(&mut self) -> StreamResult<()> {
        Ok(())
    }
}

pub type ItemIter<'a, T> = Box<dyn Iterator<Item = StreamResult<T>> + 'a>;

pub trait StreamResource {
    type Item: Clone + Debug + 'static;

    /// Opens the backing store and returns an iterator over its contents.
    fn open_read(&mut self) -> StreamResult<ItemIter<'_, Self::Item>>;

    /// Clears the backing store and returns a sink writing to it.
    fn open_write(&mut self) -> StreamResult<Box<dyn ItemSink<Self::Item> + '_>>;

    fn describe(&self) -> String;

    fn label(&self) -> &'static str {
        "item"
    }

    /// Opens a new pass over the items.
    ///
    /// The underlying handle is released when the returned stream is dropped.
    /// Errors raised by the backing store during the pass carry the number of
    /// items read so far and the last item read.
    fn reading(&mut self) -> StreamResult<ReadingStream<'_, Self::Item>> {
        let resource = self.describe();
        let label = self.label();
        debug!("opening for reading: {}", resource);
        let inner = self.open_read()?;
        Ok(ReadingStream {
            resource,
            label,
            inner,
            number: 0,
            last_item: None,
        })
    }

    /// Discards the current contents and opens the resource for writing.
    fn writing(&mut self) -> StreamResult<WritingStream<'_, Self::Item>> {
        let resource = self.describe();
        let label = self.label();
        debug!("opening for writing: {}", resource);
        let sink = self.open_write()?;
        Ok(WritingStream {
            resource,
            label,
            sink,
            number: 0,
            last_item: None,
            finished: false,
        })
    }

    /// The number of items in the resource.
    fn count(&mut self) -> StreamResult<usize> {
        let mut count = 0;
        for item in self.reading()? {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

impl<S: StreamResource + ?Sized> StreamResource for Box<S> {
    type Item = S::Item;

    fn open_read(&mut self) -> StreamResult<ItemIter<'_, S::Item>> {
        (**self).open_read()
    }

    fn open_write(&mut self) -> StreamResult<Box<dyn ItemSink<S::Item> + '_>> {
        (**self).open_write()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn label(&self) -> &'static str {
        (**self).label()
    }
}

fn render_item<T: Debug>(item: &Option<T>) -> String {
    match item {
        Some(x) => format!("{:?}", x),
        None => "None".to_string(),
    }
}

pub struct ReadingStream<'a, T> {
    resource: String,
    label: &'static str,
    inner: ItemIter<'a, T>,
    number: usize,
    last_item: Option<T>,
}

impl<'a, T: Clone + Debug> ReadingStream<'a, T> {
    /// The number of items read so far.
    pub fn item_number(&self) -> usize {
        self.number
    }

    pub fn last_item(&self) -> Option<&T> {
        self.last_item.as_ref()
    }

    /// Attaches the current position in the stream to an error.
    pub fn wrap_error(&self, err: StreamError) -> StreamError {
        ReadSnafu {
            resource: self.resource.as_str(),
            label: self.label,
            number: self.number,
            last_item: render_item(&self.last_item),
        }
        .into_error(err)
    }
}

impl<'a, T: Clone + Debug> Iterator for ReadingStream<'a, T> {
    type Item = StreamResult<T>;

    fn next(&mut self) -> Option<StreamResult<T>> {
        match self.inner.next()? {
            Ok(item) => {
                self.number += 1;
                self.last_item = Some(item.clone());
                Some(Ok(item))
            }
            Err(err) => Some(Err(self.wrap_error(err))),
        }
    }
}

impl<'a, T> Drop for ReadingStream<'a, T> {
    fn drop(&mut self) {
        debug!(
            "closing {} after reading {} {}(s)",
            self.resource, self.number, self.label
        );
    }
}

pub struct WritingStream<'a, T> {
    resource: String,
    label: &'static str,
    sink: Box<dyn ItemSink<T> + 'a>,
    number: usize,
    last_item: Option<T>,
    finished: bool,
}

impl<'a, T: Clone + Debug> WritingStream<'a, T> {
    pub fn write(&mut self, item: T) -> StreamResult<()> {
        self.number += 1;
        self.last_item = Some(item.clone());
        let res = self.sink.write_item(item);
        res.map_err(|err| self.wrap_error(err))
    }

    pub fn write_all<I: IntoIterator<Item = T>>(&mut self, items: I) -> StreamResult<()> {
        for item in items {
            self.write(item)?;
        }
        Ok(())
    }

    /// The number of items written so far.
    pub fn item_number(&self) -> usize {
        self.number
    }

    pub fn wrap_error(&self, err: StreamError) -> StreamError {
        WriteSnafu {
            resource: self.resource.as_str(),
            label: self.label,
            number: self.number,
            last_item: render_item(&self.last_item),
        }
        .into_error(err)
    }

    /// Flushes the sink and closes the stream.
    pub fn finish(mut self) -> StreamResult<()> {
        self.finished = true;
        let res = self.sink.flush();
        res.map_err(|err| self.wrap_error(err))
    }
}

impl<'a, T> Drop for WritingStream<'a, T> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.sink.flush() {
                warn!("failed to flush {} on close: {}", self.resource, err);
            }
        }
        debug!(
            "closing {} after writing {} {}(s)",
            self.resource, self.number, self.label
        );
    }
}

// **** Line codecs ****

/// Converts between the lines of a text store and the items of a resource.
pub trait LineCodec {
    type Item: Clone + Debug + 'static;

    fn label(&self) -> &'static str {
        "line"
    }

    fn parse_line(&self, line: &str) -> StreamResult<Self::Item>;

    fn format_item(&self, item: &Self::Item) -> String;
}

/// Plain text lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinesCodec;

impl LineCodec for LinesCodec {
    type Item = String;

    fn parse_line(&self, line: &str) -> StreamResult<String> {
        Ok(line.to_string())
    }

    fn format_item(&self, item: &String) -> String {
        item.clone()
    }
}

fn parse_lines<'a, R, C>(reader: R, codec: &'a C, resource: String) -> ItemIter<'a, C::Item>
where
    R: BufRead + 'a,
    C: LineCodec,
{
    Box::new(
        reader
            .lines()
            .map(move |line| -> StreamResult<C::Item> {
                let line = line.context(IoSnafu {
                    resource: resource.as_str(),
                })?;
                codec.parse_line(&line)
            }),
    )
}

struct LineSink<'a, W: Write, C> {
    out: W,
    codec: &'a C,
    resource: String,
}

impl<'a, W: Write, C: LineCodec> ItemSink<C::Item> for LineSink<'a, W, C> {
    fn write_item(&mut self, item: C::Item) -> StreamResult<()> {
        let line = self.codec.format_item(&item);
        writeln!(self.out, "{}", line).context(IoSnafu {
            resource: self.resource.as_str(),
        })
    }

    fn flush(&mut self) -> StreamResult<()> {
        self.out.flush().context(IoSnafu {
            resource: self.resource.as_str(),
        })
    }
}

// **** Resources ****

/// A placeholder resource: always empty, and it cannot be written to.
#[derive(Debug, Clone)]
pub struct NullResource<T> {
    _item: PhantomData<T>,
}

impl<T> Default for NullResource<T> {
    fn default() -> Self {
        NullResource::new()
    }
}

impl<T> NullResource<T> {
    pub fn new() -> NullResource<T> {
        NullResource { _item: PhantomData }
    }
}

impl<T: Clone + Debug + 'static> StreamResource for NullResource<T> {
    type Item = T;

    fn open_read(&mut self) -> StreamResult<ItemIter<'_, T>> {
        Ok(Box::new(std::iter::empty::<StreamResult<T>>()))
    }

    fn open_write(&mut self) -> StreamResult<Box<dyn ItemSink<T> + '_>> {
        ReadOnlySnafu {
            resource: self.describe(),
        }
        .fail()
    }

    fn describe(&self) -> String {
        "NullResource".to_string()
    }
}

/// A resource backed by a list.
#[derive(Debug, Clone)]
pub struct ListResource<T> {
    items: Vec<T>,
}

impl<T> Default for ListResource<T> {
    fn default() -> Self {
        ListResource::new(Vec::new())
    }
}

impl<T> ListResource<T> {
    pub fn new(items: Vec<T>) -> ListResource<T> {
        ListResource { items }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

struct ListSink<'a, T>(&'a mut Vec<T>);

impl<'a, T> ItemSink<T> for ListSink<'a, T> {
    fn write_item(&mut self, item: T) -> StreamResult<()> {
        self.0.push(item);
        Ok(())
    }
}

impl<T: Clone + Debug + 'static> StreamResource for ListResource<T> {
    type Item = T;

    fn open_read(&mut self) -> StreamResult<ItemIter<'_, T>> {
        Ok(Box::new(self.items.iter().cloned().map(Ok::<T, StreamError>)))
    }

    fn open_write(&mut self) -> StreamResult<Box<dyn ItemSink<T> + '_>> {
        // Same as truncating a file.
        self.items.clear();
        Ok(Box::new(ListSink(&mut self.items)))
    }

    fn describe(&self) -> String {
        format!("ListResource(len={})", self.items.len())
    }
}

/// A resource backed by an in-memory string.
#[derive(Debug, Clone, Default)]
pub struct StringResource<C> {
    contents: String,
    codec: C,
}

impl<C: LineCodec> StringResource<C> {
    pub fn new(codec: C) -> StringResource<C> {
        StringResource::with_contents("", codec)
    }

    pub fn with_contents(contents: impl Into<String>, codec: C) -> StringResource<C> {
        StringResource {
            contents: contents.into(),
            codec,
        }
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }
}

struct StringSink<'a, C> {
    out: &'a mut String,
    codec: &'a C,
}

impl<'a, C: LineCodec> ItemSink<C::Item> for StringSink<'a, C> {
    fn write_item(&mut self, item: C::Item) -> StreamResult<()> {
        self.out.push_str(&self.codec.format_item(&item));
        self.out.push('\n');
        Ok(())
    }
}

impl<C: LineCodec> StreamResource for StringResource<C> {
    type Item = C::Item;

    fn open_read(&mut self) -> StreamResult<ItemIter<'_, C::Item>> {
        let resource = self.describe();
        Ok(parse_lines(self.contents.as_bytes(), &self.codec, resource))
    }

    fn open_write(&mut self) -> StreamResult<Box<dyn ItemSink<C::Item> + '_>> {
        self.contents.clear();
        Ok(Box::new(StringSink {
            out: &mut self.contents,
            codec: &self.codec,
        }))
    }

    fn describe(&self) -> String {
        format!("StringResource(len={})", self.contents.len())
    }

    fn label(&self) -> &'static str {
        self.codec.label()
    }
}

/// A resource backed by a file on disk.
#[derive(Debug, Clone)]
pub struct FileResource<C> {
    path: PathBuf,
    codec: C,
}

impl<C: LineCodec> FileResource<C> {
    pub fn new(path: impl AsRef<Path>, codec: C) -> FileResource<C> {
        FileResource {
            path: path.as_ref().to_path_buf(),
            codec,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<C: LineCodec> StreamResource for FileResource<C> {
    type Item = C::Item;

    fn open_read(&mut self) -> StreamResult<ItemIter<'_, C::Item>> {
        let resource = self.describe();
        let file = File::open(&self.path).context(UnavailableSnafu {
            resource: resource.as_str(),
        })?;
        Ok(parse_lines(BufReader::new(file), &self.codec, resource))
    }

    fn open_write(&mut self) -> StreamResult<Box<dyn ItemSink<C::Item> + '_>> {
        let resource = self.describe();
        let file = File::create(&self.path).context(UnavailableSnafu {
            resource: resource.as_str(),
        })?;
        Ok(Box::new(LineSink {
            out: BufWriter::new(file),
            codec: &self.codec,
            resource,
        }))
    }

    fn describe(&self) -> String {
        format!("FileResource(path={:?})", self.path)
    }

    fn label(&self) -> &'static str {
        self.codec.label()
    }
}

/// A resource for temporary use.
///
/// The contents start in memory and roll over to an anonymous file once they
/// grow past `max_size` bytes. No handle is created until the resource is
/// first opened. The storage is reclaimed when the resource is dropped.
pub struct TempResource<C> {
    file: Option<SpooledTempFile>,
    max_size: usize,
    codec: C,
}

impl<C: LineCodec> TempResource<C> {
    pub fn new(codec: C) -> TempResource<C> {
        TempResource::with_max_size(DEFAULT_SPOOL_SIZE, codec)
    }

    pub fn with_max_size(max_size: usize, codec: C) -> TempResource<C> {
        TempResource {
            file: None,
            max_size,
            codec,
        }
    }

    /// True once the contents have been moved to disk.
    pub fn is_on_disk(&self) -> bool {
        self.file.as_ref().map(|f| f.is_rolled()).unwrap_or(false)
    }
}

impl<C> Debug for TempResource<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempResource")
            .field("max_size", &self.max_size)
            .field("opened", &self.file.is_some())
            .finish()
    }
}

impl<C: LineCodec> StreamResource for TempResource<C> {
    type Item = C::Item;

    fn open_read(&mut self) -> StreamResult<ItemIter<'_, C::Item>> {
        let resource = self.describe();
        let max_size = self.max_size;
        let file = self
            .file
            .get_or_insert_with(|| tempfile::spooled_tempfile(max_size));
        file.seek(SeekFrom::Start(0)).context(IoSnafu {
            resource: resource.as_str(),
        })?;
        Ok(parse_lines(BufReader::new(file), &self.codec, resource))
    }

    fn open_write(&mut self) -> StreamResult<Box<dyn ItemSink<C::Item> + '_>> {
        let resource = self.describe();
        let max_size = self.max_size;
        let file = self
            .file
            .get_or_insert_with(|| tempfile::spooled_tempfile(max_size));
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.set_len(0))
            .context(IoSnafu {
                resource: resource.as_str(),
            })?;
        Ok(Box::new(LineSink {
            out: BufWriter::new(file),
            codec: &self.codec,
            resource,
        }))
    }

    fn describe(&self) -> String {
        format!(
            "TempResource(max_size={}, on_disk={})",
            self.max_size,
            self.is_on_disk()
        )
    }

    fn label(&self) -> &'static str {
        self.codec.label()
    }
}
