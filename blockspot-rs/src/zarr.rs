use ndarray::Array3;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use zarrs::array::{data_type, Array, ArrayBuilder, ArraySubset, DataType};
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::ReadableWritableListableStorageTraits;

use crate::error::{BlockspotError, Result};
use crate::mask::ForegroundMask;
use crate::volume::Volume;

pub type Store = Arc<FilesystemStore>;

/// Type alias for arrays in the store.
pub type StoreArray = Array<dyn ReadableWritableListableStorageTraits>;

fn zarr_err(e: impl std::fmt::Display) -> BlockspotError {
    BlockspotError::Zarr(e.to_string())
}

pub fn open_store(root: &Path) -> Result<Store> {
    let store = FilesystemStore::new(root).map_err(zarr_err)?;
    Ok(Arc::new(store))
}

/// Open a Zarr array (v2 or v3 metadata).
pub fn open_array(store: &Store, path: &str) -> Result<StoreArray> {
    let store_trait: Arc<dyn ReadableWritableListableStorageTraits> = store.clone();
    let array = Array::open(store_trait, path).map_err(zarr_err)?;
    Ok(array)
}

pub fn create_array_u16(
    store: &Store,
    path: &str,
    shape: Vec<u64>,
    chunks: Vec<u64>,
    attrs: Option<Map<String, Value>>,
) -> Result<StoreArray> {
    let store_trait: Arc<dyn ReadableWritableListableStorageTraits> = store.clone();
    let mut builder = ArrayBuilder::new(shape, chunks, data_type::uint16(), 0u16);
    if let Some(attributes) = attrs {
        builder.attributes(attributes);
    }
    let array = builder.build(store_trait, path).map_err(zarr_err)?;
    array.store_metadata().map_err(zarr_err)?;
    Ok(array)
}

pub fn store_region_u16(
    array: &StoreArray,
    origin: [u64; 3],
    shape: [u64; 3],
    data: &[u16],
) -> Result<()> {
    let subset = subset(origin, shape);
    array.store_array_subset(&subset, data).map_err(zarr_err)?;
    Ok(())
}

fn subset(origin: [u64; 3], shape: [u64; 3]) -> ArraySubset {
    let ranges: Vec<std::ops::Range<u64>> =
        (0..3).map(|a| origin[a]..origin[a] + shape[a]).collect();
    ArraySubset::new_with_ranges(&ranges)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

/// Element type of an opened array. Byte order is handled by the codec
/// chain, so big-endian v2 arrays map to the same types.
fn element_type(dt: &DataType, path: &str) -> Result<ElementType> {
    let known = [
        (data_type::bool(), ElementType::Bool),
        (data_type::uint8(), ElementType::U8),
        (data_type::uint16(), ElementType::U16),
        (data_type::uint32(), ElementType::U32),
        (data_type::uint64(), ElementType::U64),
        (data_type::int8(), ElementType::I8),
        (data_type::int16(), ElementType::I16),
        (data_type::int32(), ElementType::I32),
        (data_type::int64(), ElementType::I64),
        (data_type::float32(), ElementType::F32),
        (data_type::float64(), ElementType::F64),
    ];
    known
        .into_iter()
        .find(|(t, _)| t == dt)
        .map(|(_, e)| e)
        .ok_or_else(|| BlockspotError::UnsupportedDtype(format!("{} ({})", path, dt)))
}

macro_rules! retrieve_as_f32 {
    ($array:expr, $subset:expr, $t:ty) => {
        $array
            .retrieve_array_subset::<Vec<$t>>($subset)
            .map(|v| v.into_iter().map(|x| x as f32).collect::<Vec<f32>>())
    };
}

/// A 3-D array in a filesystem store, read one region at a time.
pub struct ZarrVolume {
    array: StoreArray,
    path: String,
    shape: [u64; 3],
    element: ElementType,
}

impl ZarrVolume {
    pub fn open(store: &Store, path: &str) -> Result<Self> {
        let array = open_array(store, path)?;
        let shape = <[u64; 3]>::try_from(array.shape()).map_err(|_| {
            BlockspotError::Config(format!(
                "{} has {} dimensions, expected 3",
                path,
                array.shape().len()
            ))
        })?;
        let element = element_type(array.data_type(), path)?;
        Ok(Self {
            array,
            path: path.to_string(),
            shape,
            element,
        })
    }

    /// Voxel spacing in array axis order (see [`voxel_spacing`]).
    pub fn spacing(&self) -> [f64; 3] {
        voxel_spacing(self.array.attributes())
    }

    /// Read the whole array as a foreground mask (nonzero is foreground).
    pub fn to_mask(&self) -> Result<ForegroundMask> {
        let values = self.read([0; 3], self.shape)?;
        Ok(ForegroundMask::from_values(&values))
    }
}

impl Volume for ZarrVolume {
    fn shape(&self) -> [u64; 3] {
        self.shape
    }

    fn read(&self, origin: [u64; 3], shape: [u64; 3]) -> Result<Array3<f32>> {
        let subset = subset(origin, shape);
        let data = match self.element {
            ElementType::Bool => self
                .array
                .retrieve_array_subset::<Vec<bool>>(&subset)
                .map(|v| v.into_iter().map(|x| if x { 1.0 } else { 0.0 }).collect()),
            ElementType::U8 => retrieve_as_f32!(self.array, &subset, u8),
            ElementType::U16 => retrieve_as_f32!(self.array, &subset, u16),
            ElementType::U32 => retrieve_as_f32!(self.array, &subset, u32),
            ElementType::U64 => retrieve_as_f32!(self.array, &subset, u64),
            ElementType::I8 => retrieve_as_f32!(self.array, &subset, i8),
            ElementType::I16 => retrieve_as_f32!(self.array, &subset, i16),
            ElementType::I32 => retrieve_as_f32!(self.array, &subset, i32),
            ElementType::I64 => retrieve_as_f32!(self.array, &subset, i64),
            ElementType::F32 => retrieve_as_f32!(self.array, &subset, f32),
            ElementType::F64 => retrieve_as_f32!(self.array, &subset, f64),
        }
        .map_err(|e| BlockspotError::Read {
            origin,
            shape,
            message: format!("{}: {}", self.path, e),
        })?;
        let dim = (shape[0] as usize, shape[1] as usize, shape[2] as usize);
        Array3::from_shape_vec(dim, data).map_err(|e| BlockspotError::Read {
            origin,
            shape,
            message: e.to_string(),
        })
    }
}

/// Voxel spacing from array attributes, in array axis order.
///
/// `spacing` is taken as-is. N5-style `pixelResolution` (a list or an object
/// with `dimensions`) and `downsamplingFactors` are in x, y, z order and get
/// reversed. Missing metadata means unit spacing.
pub fn voxel_spacing(attrs: &Map<String, Value>) -> [f64; 3] {
    if let Some(s) = attrs.get("spacing").and_then(triple) {
        return s;
    }
    let resolution = attrs.get("pixelResolution").and_then(|v| match v {
        Value::Object(o) => o.get("dimensions").and_then(triple),
        other => triple(other),
    });
    let Some(res) = resolution else {
        return [1.0; 3];
    };
    let factors = attrs
        .get("downsamplingFactors")
        .and_then(triple)
        .unwrap_or([1.0; 3]);
    [res[2] * factors[2], res[1] * factors[1], res[0] * factors[0]]
}

fn triple(v: &Value) -> Option<[f64; 3]> {
    let arr = v.as_array()?;
    if arr.len() != 3 {
        return None;
    }
    Some([arr[0].as_f64()?, arr[1].as_f64()?, arr[2].as_f64()?])
}
