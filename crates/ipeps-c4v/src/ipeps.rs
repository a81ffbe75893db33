//! Single-site C4v-symmetric iPEPS.
//!
//! The state is one rank-5 tensor `[p, u, l, d, r]` repeated on every site.
//! States are stored as JSON with one entry line `"p u l d r value"` per
//! non-zero element, together with the unit-cell layout (`lX`, `lY`, site
//! map); only single-site unit cells are accepted here.

use std::fmt;
use std::fs;
use std::path::Path;

use ipeps_tensor::{DenseTensor, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::symmetry::make_c4v_symm;

/// Translation-invariant iPEPS with a single on-site tensor.
#[derive(Debug, Clone)]
pub struct IpepsC4v {
    site: Tensor,
}

impl IpepsC4v {
    /// Wrap an on-site tensor of shape `[p, D, D, D, D]`.
    pub fn new(site: Tensor) -> Result<Self> {
        let dims = site.dims();
        if dims.len() != 5 || dims[1..].iter().any(|&d| d != dims[1]) {
            return Err(Error::invalid_state(format!(
                "site tensor must be [p, D, D, D, D], got {dims:?}"
            )));
        }
        Ok(Self { site })
    }

    /// Random C4v-symmetric state with entries drawn from `U[0, 1)`,
    /// normalized by its largest element.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, phys_dim: usize, bond_dim: usize) -> Result<Self> {
        let dims = [phys_dim, bond_dim, bond_dim, bond_dim, bond_dim];
        let site = Tensor::constant(DenseTensor::random(rng, &dims));
        Self::new(site)?.symmetrized()?.normalized()
    }

    /// On-site tensor.
    #[must_use]
    pub fn site(&self) -> &Tensor {
        &self.site
    }

    /// Physical dimension `p`.
    #[must_use]
    pub fn phys_dim(&self) -> usize {
        self.site.dims()[0]
    }

    /// Auxiliary bond dimension `D`.
    #[must_use]
    pub fn bond_dim(&self) -> usize {
        self.site.dims()[1]
    }

    /// Project onto the C4v-invariant subspace.
    pub fn symmetrized(&self) -> Result<Self> {
        Ok(Self {
            site: make_c4v_symm(&self.site)?,
        })
    }

    /// Divide by the largest element magnitude.
    pub fn normalized(&self) -> Result<Self> {
        Ok(Self {
            site: self.site.normalize_max_abs()?,
        })
    }

    /// Same tensor, cut from any gradient tape.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self {
            site: self.site.detach(),
        }
    }

    /// Zero-pad the auxiliary legs to `bond_dim`.
    pub fn extend_bond_dim(&self, bond_dim: usize) -> Result<Self> {
        if bond_dim < self.bond_dim() {
            return Err(Error::invalid_state(format!(
                "cannot shrink bond dimension from {} to {bond_dim}",
                self.bond_dim()
            )));
        }
        let dims = [self.phys_dim(), bond_dim, bond_dim, bond_dim, bond_dim];
        Self::new(Tensor::constant(self.site.value().resized(&dims)?))
    }

    /// Add uniform noise of amplitude `noise` and renormalize.
    pub fn add_random_noise<R: Rng + ?Sized>(&self, rng: &mut R, noise: f64) -> Result<Self> {
        let perturbation = DenseTensor::random(rng, self.site.dims()).scale(noise);
        let site = Tensor::constant(self.site.value().add(&perturbation)?);
        Self::new(site)?.normalized()
    }

    /// Write the state in the JSON layout read by [`read_ipeps`].
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&StateFile::from_site(self.site.value()))?;
        fs::write(path, json).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl fmt::Display for IpepsC4v {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.site.value();
        writeln!(f, "IpepsC4v(phys_dim={}, bond_dim={})", self.phys_dim(), self.bond_dim())?;
        write!(f, "  site (0,0): norm={:.6e} max_abs={:.6e}", value.norm(), value.max_abs())
    }
}

/// Read a single-site state written by [`IpepsC4v::write_to_file`].
pub fn read_ipeps(path: impl AsRef<Path>) -> Result<IpepsC4v> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: StateFile = serde_json::from_str(&text)?;
    file.into_state()
}

/// Starting state of an optimization run.
///
/// With `instate` set, the state is read, padded to `bond_dim`, perturbed by
/// `instate_noise` and projected onto C4v. Otherwise `ipeps_init_type` must
/// be `RANDOM`.
pub fn initial_state<R: Rng + ?Sized>(cfg: &Config, phys_dim: usize, rng: &mut R) -> Result<IpepsC4v> {
    let args = &cfg.state;
    let state = match &args.instate {
        Some(path) => {
            info!(path = %path.display(), "reading initial state");
            let mut state = read_ipeps(path)?;
            if state.phys_dim() != phys_dim {
                return Err(Error::invalid_state(format!(
                    "state has physical dimension {}, model expects {phys_dim}",
                    state.phys_dim()
                )));
            }
            if args.bond_dim > state.bond_dim() {
                state = state.extend_bond_dim(args.bond_dim)?;
            }
            if args.instate_noise > 0.0 {
                state = state.add_random_noise(rng, args.instate_noise)?;
            }
            state.symmetrized()?.normalized()?
        }
        None if args.ipeps_init_type.eq_ignore_ascii_case("RANDOM") => {
            IpepsC4v::random(rng, phys_dim, args.bond_dim)?
        }
        None => {
            return Err(Error::config(format!(
                "missing trial state: no instate given and ipeps_init_type {:?} is not supported",
                args.ipeps_init_type
            )))
        }
    };
    Ok(state)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateFile {
    #[serde(rename = "lX")]
    lx: usize,
    #[serde(rename = "lY")]
    ly: usize,
    sites: Vec<SiteFile>,
    #[serde(default)]
    site_ids: Vec<String>,
    #[serde(default)]
    map: Vec<SiteMapEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteFile {
    site_id: String,
    phys_dim: usize,
    aux_dim: Vec<usize>,
    num_entries: usize,
    entries: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteMapEntry {
    site_id: String,
    x: i64,
    y: i64,
}

const SITE_ID: &str = "A";

impl StateFile {
    fn from_site(site: &DenseTensor) -> Self {
        let dims = site.dims();
        let entries: Vec<String> = {
            let mut entries = Vec::new();
            let mut index = vec![0usize; dims.len()];
            for &value in site.data() {
                if value != 0.0 {
                    let idx: Vec<String> = index.iter().map(usize::to_string).collect();
                    entries.push(format!("{} {value}", idx.join(" ")));
                }
                for axis in (0..dims.len()).rev() {
                    index[axis] += 1;
                    if index[axis] < dims[axis] {
                        break;
                    }
                    index[axis] = 0;
                }
            }
            entries
        };
        Self {
            lx: 1,
            ly: 1,
            sites: vec![SiteFile {
                site_id: SITE_ID.to_string(),
                phys_dim: dims[0],
                aux_dim: dims[1..].to_vec(),
                num_entries: entries.len(),
                entries,
            }],
            site_ids: vec![SITE_ID.to_string()],
            map: vec![SiteMapEntry {
                site_id: SITE_ID.to_string(),
                x: 0,
                y: 0,
            }],
        }
    }

    fn into_state(self) -> Result<IpepsC4v> {
        if self.lx != 1 || self.ly != 1 || self.sites.len() != 1 {
            return Err(Error::invalid_state(format!(
                "expected a single-site unit cell, got lX={} lY={} with {} sites",
                self.lx,
                self.ly,
                self.sites.len()
            )));
        }
        let Some(site) = self.sites.into_iter().next() else {
            return Err(Error::invalid_state("state file lists no sites"));
        };
        let p = site.phys_dim;
        let d = match site.aux_dim.as_slice() {
            [d, rest @ ..] if rest.len() == 3 && rest.iter().all(|x| x == d) => *d,
            other => {
                return Err(Error::invalid_state(format!(
                    "auxDim must list four equal bond dimensions, got {other:?}"
                )))
            }
        };
        let mut tensor = DenseTensor::zeros(&[p, d, d, d, d]);
        for line in &site.entries {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 6 {
                return Err(Error::invalid_state(format!(
                    "entry {line:?} must read \"p u l d r value\""
                )));
            }
            let mut index = [0usize; 5];
            for (slot, field) in index.iter_mut().zip(&fields[..5]) {
                *slot = field
                    .parse()
                    .map_err(|_| Error::invalid_state(format!("bad index in entry {line:?}")))?;
            }
            if index[0] >= p || index[1..].iter().any(|&i| i >= d) {
                return Err(Error::invalid_state(format!("entry {line:?} is out of range")));
            }
            let value: f64 = fields[5]
                .parse()
                .map_err(|_| Error::invalid_state(format!("bad value in entry {line:?}")))?;
            tensor.set(&index, value);
        }
        IpepsC4v::new(Tensor::constant(tensor))
    }
}
