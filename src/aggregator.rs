//! C8: fold operators that maintain one unpacked sketch across a stream of
//! inputs and serialize (or estimate) once at the end. Grounded in
//! `original_source/hll.c`'s `hll_add_trans*`/`hll_union_trans`/
//! `hll_*_final` transition functions, reworked as owned Rust types instead
//! of a PostgreSQL aggregate-state `MemoryContext` blob.

use crate::Hll;
use crate::config;
use crate::error::HllError;
use crate::settings::Settings;

/// Maintains a sketch across a stream of raw hashes. Starts `UNINIT`
/// (`sketch: None`) until the first non-null hash establishes parameters.
#[derive(Debug, Default)]
pub struct AddAggregator {
    settings: Option<Settings>,
    sketch: Option<Hll>,
}

impl AddAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies parameters for the 2/3/4-argument `add_agg` transition
    /// variants. Must be called before the sketch is established by the
    /// first hash; calling it afterwards is a context misuse, there is no
    /// way to re-parameterize a sketch already in flight.
    pub fn offer_params(&mut self, settings: Settings) -> Result<(), HllError> {
        if self.sketch.is_some() {
            return Err(HllError::context(
                "add_agg parameters supplied after the sketch was already established",
            ));
        }
        self.settings = Some(settings);
        Ok(())
    }

    /// Offers one hash. `None` is a null input and is skipped per §4.8.
    pub fn offer_hash(&mut self, hash: Option<u64>) {
        let Some(h) = hash else {
            return;
        };

        if self.sketch.is_none() {
            let settings = self
                .settings
                .unwrap_or_else(|| config::global().defaults);
            self.sketch = Some(Hll::new(settings));
        }

        if let Some(sketch) = &mut self.sketch {
            sketch.add_raw(h);
        }
    }

    pub fn finish_bytes(&self) -> Option<Vec<u8>> {
        self.sketch.as_ref().map(Hll::to_bytes)
    }

    pub fn finish_cardinality(&self) -> Result<Option<f64>, HllError> {
        match &self.sketch {
            None => Ok(None),
            Some(s) => s.cardinality(),
        }
    }

    pub fn finish_floor(&self) -> Result<Option<i64>, HllError> {
        Ok(self.finish_cardinality()?.map(|c| c.floor() as i64))
    }

    pub fn finish_ceil(&self) -> Result<Option<i64>, HllError> {
        Ok(self.finish_cardinality()?.map(|c| c.ceil() as i64))
    }
}

/// Maintains a sketch across a stream of serialized sketches, unioning each
/// one in. The first non-null input supplies the running parameters;
/// subsequent inputs are checked against them (`IncompatibleMetadata` on
/// mismatch, per invariant 6 — aggregation always runs `union` in strict
/// mode).
#[derive(Debug, Default)]
pub struct UnionAggregator {
    sketch: Option<Hll>,
}

impl UnionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers one serialized sketch. `None` is a null input and is skipped.
    pub fn offer_sketch(&mut self, bytes: Option<&[u8]>) -> Result<(), HllError> {
        let Some(bytes) = bytes else {
            return Ok(());
        };

        let incoming = Hll::from_bytes(bytes)?;
        match &mut self.sketch {
            None => self.sketch = Some(incoming),
            Some(sketch) => sketch.union(true, &incoming)?,
        }
        Ok(())
    }

    pub fn finish_bytes(&self) -> Option<Vec<u8>> {
        self.sketch.as_ref().map(Hll::to_bytes)
    }

    pub fn finish_cardinality(&self) -> Result<Option<f64>, HllError> {
        match &self.sketch {
            None => Ok(None),
            Some(s) => s.cardinality(),
        }
    }

    pub fn finish_floor(&self) -> Result<Option<i64>, HllError> {
        Ok(self.finish_cardinality()?.map(|c| c.floor() as i64))
    }

    pub fn finish_ceil(&self) -> Result<Option<i64>, HllError> {
        Ok(self.finish_cardinality()?.map(|c| c.ceil() as i64))
    }
}
