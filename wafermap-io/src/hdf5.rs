//! HDF5 backend for the hierarchical store.
//!
//! Scalars are written as 0-d datasets, arrays as 1-d datasets and text as
//! variable-length UTF-8. Reads also accept fixed-length strings and any
//! integer width written by other tools.

use crate::batch::{ingest_batch, BatchReport, FailurePolicy};
use crate::Result;
use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, Dataset, File, Group, Location};
use ndarray::ArrayView1;
use std::path::Path;
use std::str::FromStr;
use wafermap_core::store::{components, join, split_parent};
use wafermap_core::{DataValue, Error as CoreError, HierarchicalStore, Result as CoreResult};
use wafermap_grid::{compact, CanonicalGrid, CompactSummary};
use wafermap_ingest::IngestConfig;

/// Capacity used when reading fixed-length strings.
const FIXED_STRING_CAPACITY: usize = 1024;

trait Backend<T> {
    fn backend(self) -> CoreResult<T>;
}

impl<T> Backend<T> for hdf5::Result<T> {
    fn backend(self) -> CoreResult<T> {
        self.map_err(CoreError::backend)
    }
}

/// How an HDF5 file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the file must exist.
    Read,
    /// Read/write, created if missing.
    Append,
    /// Created, truncating any existing file.
    Truncate,
}

/// A [`HierarchicalStore`] backed by one HDF5 file.
///
/// The file is closed when the store is dropped.
pub struct Hdf5Store {
    file: File,
}

enum Node {
    Group(Group),
    Dataset(Dataset),
}

impl Node {
    fn location(&self) -> &Location {
        match self {
            Self::Group(group) => group,
            Self::Dataset(dataset) => dataset,
        }
    }
}

impl Hdf5Store {
    /// Opens an HDF5 file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened in `mode`.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let file = match mode {
            OpenMode::Read => File::open(path)?,
            OpenMode::Append => File::append(path)?,
            OpenMode::Truncate => File::create(path)?,
        };
        Ok(Self { file })
    }

    /// Creates an empty store, truncating any existing file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path, OpenMode::Truncate)
    }

    /// Underlying file handle.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Flushes pending writes to disk.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&self) -> Result<()> {
        Ok(self.file.flush()?)
    }

    fn group(&self, path: &str) -> CoreResult<Group> {
        self.file
            .group(path)
            .map_err(|_| CoreError::Lookup(format!("group `{path}`")))
    }

    fn dataset(&self, path: &str) -> CoreResult<Dataset> {
        if !self.contains(path) {
            return Err(CoreError::Lookup(format!("dataset `{path}`")));
        }
        self.file
            .dataset(path)
            .map_err(|_| CoreError::Lookup(format!("dataset `{path}`")))
    }

    fn node(&self, path: &str) -> CoreResult<Node> {
        if !self.contains(path) {
            return Err(CoreError::Lookup(format!("`{path}`")));
        }
        if self.is_group(path) {
            Ok(Node::Group(self.group(path)?))
        } else {
            Ok(Node::Dataset(self.dataset(path)?))
        }
    }
}

impl HierarchicalStore for Hdf5Store {
    fn contains(&self, path: &str) -> bool {
        let mut current = String::from("/");
        for name in components(path) {
            let Ok(group) = self.file.group(&current) else {
                return false;
            };
            if !group.link_exists(name) {
                return false;
            }
            current = join(&current, name);
        }
        true
    }

    fn is_group(&self, path: &str) -> bool {
        self.contains(path) && self.file.group(path).is_ok()
    }

    fn create_group(&mut self, path: &str) -> CoreResult<()> {
        let mut current = String::from("/");
        for name in components(path) {
            let parent = self.group(&current)?;
            let next = join(&current, name);
            if !parent.link_exists(name) {
                parent.create_group(name).backend()?;
            } else if parent.group(name).is_err() {
                return Err(CoreError::InvalidFormat(format!(
                    "`{next}` is a dataset, not a group"
                )));
            }
            current = next;
        }
        Ok(())
    }

    fn members(&self, path: &str) -> CoreResult<Vec<String>> {
        let mut names = self.group(path)?.member_names().backend()?;
        names.sort();
        Ok(names)
    }

    fn write(&mut self, path: &str, value: DataValue) -> CoreResult<()> {
        let (parent_path, name) = split_parent(path);
        let parent = self.group(parent_path)?;
        if parent.link_exists(name) {
            parent.unlink(name).backend()?;
        }
        write_value(&parent, name, &value)
    }

    fn read(&self, path: &str) -> CoreResult<DataValue> {
        read_value(&self.dataset(path)?, path)
    }

    fn set_attr(&mut self, path: &str, name: &str, value: &str) -> CoreResult<()> {
        let node = self.node(path)?;
        let location = node.location();
        let value = to_var_len_unicode(value)?;
        if has_attr(location, name)? {
            location.attr(name).backend()?.write_scalar(&value).backend()
        } else {
            location
                .new_attr::<VarLenUnicode>()
                .create(name)
                .backend()?
                .write_scalar(&value)
                .backend()
        }
    }

    fn attr(&self, path: &str, name: &str) -> CoreResult<Option<String>> {
        let node = self.node(path)?;
        let location = node.location();
        if !has_attr(location, name)? {
            return Ok(None);
        }
        let attr = location.attr(name).backend()?;
        read_attr_string(&attr, path, name).map(Some)
    }

    fn move_node(&mut self, from: &str, to: &str) -> CoreResult<()> {
        if !self.contains(from) {
            return Err(CoreError::Lookup(format!("`{from}`")));
        }
        if self.contains(to) {
            return Err(CoreError::InvalidFormat(format!("`{to}` already exists")));
        }
        let (to_parent, _) = split_parent(to);
        if !self.is_group(to_parent) {
            return Err(CoreError::Lookup(format!("group `{to_parent}`")));
        }
        let (from_parent, from_name) = split_parent(from);
        self.group(from_parent)?.relink(from_name, to).backend()
    }

    fn remove(&mut self, path: &str) -> CoreResult<()> {
        if !self.contains(path) {
            return Err(CoreError::Lookup(format!("`{path}`")));
        }
        let (parent, name) = split_parent(path);
        self.group(parent)?.unlink(name).backend()
    }
}

fn write_value(group: &Group, name: &str, value: &DataValue) -> CoreResult<()> {
    match value {
        DataValue::Float(v) => group
            .new_dataset::<f64>()
            .shape(())
            .create(name)
            .backend()?
            .write_scalar(v)
            .backend(),
        DataValue::Int(v) => group
            .new_dataset::<i64>()
            .shape(())
            .create(name)
            .backend()?
            .write_scalar(v)
            .backend(),
        DataValue::Text(text) => {
            let text = to_var_len_unicode(text)?;
            group
                .new_dataset::<VarLenUnicode>()
                .shape(())
                .create(name)
                .backend()?
                .write_scalar(&text)
                .backend()
        }
        DataValue::FloatArray(values) => write_array(group, name, values),
        DataValue::IntArray(values) => write_array(group, name, values),
    }
}

fn write_array<T: hdf5::H5Type>(group: &Group, name: &str, values: &[T]) -> CoreResult<()> {
    let dataset = group
        .new_dataset::<T>()
        .shape((values.len(),))
        .create(name)
        .backend()?;
    if values.is_empty() {
        return Ok(());
    }
    dataset.write(ArrayView1::from(values)).backend()
}

fn read_value(dataset: &Dataset, path: &str) -> CoreResult<DataValue> {
    let descriptor = dataset.dtype().backend()?.to_descriptor().backend()?;
    let scalar = dataset.ndim() == 0;
    let value = match descriptor {
        TypeDescriptor::Float(_) if scalar => DataValue::Float(dataset.read_scalar().backend()?),
        TypeDescriptor::Float(_) => DataValue::FloatArray(dataset.read_raw().backend()?),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) if scalar => {
            DataValue::Int(dataset.read_scalar().backend()?)
        }
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            DataValue::IntArray(dataset.read_raw().backend()?)
        }
        TypeDescriptor::VarLenUnicode if scalar => {
            DataValue::Text(dataset.read_scalar::<VarLenUnicode>().backend()?.to_string())
        }
        TypeDescriptor::VarLenAscii if scalar => {
            DataValue::Text(dataset.read_scalar::<VarLenAscii>().backend()?.to_string())
        }
        TypeDescriptor::FixedAscii(_) if scalar => DataValue::Text(
            dataset
                .read_scalar::<FixedAscii<FIXED_STRING_CAPACITY>>()
                .backend()?
                .as_str()
                .to_string(),
        ),
        TypeDescriptor::FixedUnicode(_) if scalar => DataValue::Text(
            dataset
                .read_scalar::<FixedUnicode<FIXED_STRING_CAPACITY>>()
                .backend()?
                .as_str()
                .to_string(),
        ),
        _ => {
            return Err(CoreError::TypeMismatch {
                path: path.to_string(),
                expected: "numeric scalar, numeric 1-d array or string",
            })
        }
    };
    Ok(value)
}

fn has_attr(location: &Location, name: &str) -> CoreResult<bool> {
    Ok(location
        .attr_names()
        .backend()?
        .iter()
        .any(|attr| attr == name))
}

fn read_attr_string(attr: &Attribute, path: &str, name: &str) -> CoreResult<String> {
    let value = match attr.dtype().backend()?.to_descriptor().backend()? {
        TypeDescriptor::VarLenUnicode => attr.read_scalar::<VarLenUnicode>().backend()?.to_string(),
        TypeDescriptor::VarLenAscii => attr.read_scalar::<VarLenAscii>().backend()?.to_string(),
        TypeDescriptor::FixedAscii(_) => attr
            .read_scalar::<FixedAscii<FIXED_STRING_CAPACITY>>()
            .backend()?
            .as_str()
            .to_string(),
        TypeDescriptor::FixedUnicode(_) => attr
            .read_scalar::<FixedUnicode<FIXED_STRING_CAPACITY>>()
            .backend()?
            .as_str()
            .to_string(),
        TypeDescriptor::Float(_) => attr.read_scalar::<f64>().backend()?.to_string(),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            attr.read_scalar::<i64>().backend()?.to_string()
        }
        _ => {
            return Err(CoreError::TypeMismatch {
                path: format!("{path}@{name}"),
                expected: "string attribute",
            })
        }
    };
    Ok(value)
}

fn to_var_len_unicode(value: &str) -> CoreResult<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| CoreError::InvalidFormat(format!("invalid utf-8 string: {e}")))
}

/// Ingests spectrum files into the store at `store_path`, creating it if
/// missing. The file is held open for the duration of the call only.
///
/// # Errors
/// Returns an error if the store cannot be opened, or per `policy`.
pub fn ingest_files<P, Q>(
    store_path: P,
    files: &[Q],
    config: &IngestConfig,
    policy: FailurePolicy,
) -> Result<BatchReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut store = Hdf5Store::open(store_path, OpenMode::Append)?;
    let report = ingest_batch(&mut store, files, config, policy)?;
    store.flush()?;
    Ok(report)
}

/// Writes the canonical re-gridding of `source` into a new file `target`.
///
/// # Errors
/// Returns an error if either file cannot be opened or a read fails.
pub fn compact_file<P, Q>(source: P, target: Q, grid: &CanonicalGrid) -> Result<CompactSummary>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let source = Hdf5Store::open(source, OpenMode::Read)?;
    let mut target = Hdf5Store::create(target)?;
    let summary = compact(&source, &mut target, grid)?;
    target.flush()?;
    Ok(summary)
}

/// Runs a query against a read-only store.
///
/// # Errors
/// Returns an error if the file cannot be opened or `query` fails.
pub fn with_store<P, R, F>(path: P, query: F) -> Result<R>
where
    P: AsRef<Path>,
    F: FnOnce(&Hdf5Store) -> CoreResult<R>,
{
    let store = Hdf5Store::open(path, OpenMode::Read)?;
    Ok(query(&store)?)
}
