use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_graph::{ConversionGraph, ConversionId, ConversionModel};

use super::{ensure_valid, Operator, ProposalContext};

const DEFAULT_APERTURE: f64 = 0.01;

/// Half-width of the shift window for a locus of `sites` sites.
fn shift_radius(sites: usize, aperture: f64) -> usize {
    (sites as f64 * aperture).round() as usize / 2
}

/// Draws a signed offset uniformly from `[-radius, radius]`.
fn draw_offset(radius: usize, rng: &mut RngHandle) -> isize {
    rng.uniform_index(2 * radius + 1) as isize - radius as isize
}

fn offset_site(site: usize, offset: isize) -> Option<usize> {
    site.checked_add_signed(offset)
}

fn pick(acg: &ConversionGraph, rng: &mut RngHandle) -> Option<(ConversionId, usize, usize, usize)> {
    let id = acg.choose_conversion(rng)?;
    let conv = acg.conversion(id)?;
    Some((id, conv.locus(), conv.start(), conv.end()))
}

fn apply(
    acg: &mut ConversionGraph,
    id: ConversionId,
    locus: usize,
    start: usize,
    end: usize,
) -> Result<f64, AcgError> {
    if start > end || !acg.region_is_free(locus, start, end, Some(id)) {
        return Ok(f64::NEG_INFINITY);
    }
    acg.set_conversion_region(id, start, end)?;
    Ok(0.0)
}

/// Slides a converted region along its locus by a uniform offset.
#[derive(Debug, Clone, Copy)]
pub struct ConvertedRegionShift {
    aperture: f64,
}

impl Default for ConvertedRegionShift {
    fn default() -> Self {
        Self {
            aperture: DEFAULT_APERTURE,
        }
    }
}

impl ConvertedRegionShift {
    /// `aperture` is the fraction of the locus length spanned by the window.
    pub fn new(aperture: f64) -> Self {
        Self { aperture }
    }
}

impl Operator for ConvertedRegionShift {
    fn name(&self) -> &'static str {
        "converted-region-shift"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        _ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        if acg.whole_locus_mode() {
            return Ok(f64::NEG_INFINITY);
        }
        let Some((id, locus, start, end)) = pick(acg, rng) else {
            return Ok(f64::NEG_INFINITY);
        };
        let sites = acg.locus(locus).map_or(0, |l| l.site_count());
        let radius = shift_radius(sites, self.aperture);
        if radius == 0 {
            return Ok(f64::NEG_INFINITY);
        }
        let offset = draw_offset(radius, rng);
        let (Some(start), Some(end)) = (offset_site(start, offset), offset_site(end, offset)) else {
            return Ok(f64::NEG_INFINITY);
        };
        let log_hr = apply(acg, id, locus, start, end)?;
        if log_hr.is_finite() {
            ensure_valid(acg, self.name())?;
        }
        Ok(log_hr)
    }
}

/// Moves one boundary of a converted region, keeping the other fixed.
#[derive(Debug, Clone, Copy)]
pub struct ConvertedRegionBoundaryShift {
    aperture: f64,
}

impl Default for ConvertedRegionBoundaryShift {
    fn default() -> Self {
        Self {
            aperture: DEFAULT_APERTURE,
        }
    }
}

impl ConvertedRegionBoundaryShift {
    /// `aperture` is the fraction of the locus length spanned by the window.
    pub fn new(aperture: f64) -> Self {
        Self { aperture }
    }
}

impl Operator for ConvertedRegionBoundaryShift {
    fn name(&self) -> &'static str {
        "converted-region-boundary-shift"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        _ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        if acg.whole_locus_mode() {
            return Ok(f64::NEG_INFINITY);
        }
        let Some((id, locus, start, end)) = pick(acg, rng) else {
            return Ok(f64::NEG_INFINITY);
        };
        let sites = acg.locus(locus).map_or(0, |l| l.site_count());
        let radius = shift_radius(sites, self.aperture);
        if radius == 0 {
            return Ok(f64::NEG_INFINITY);
        }
        let move_start = rng.coin();
        let offset = draw_offset(radius, rng);
        let shifted = if move_start {
            offset_site(start, offset).map(|s| (s, end))
        } else {
            offset_site(end, offset).map(|e| (start, e))
        };
        let Some((start, end)) = shifted else {
            return Ok(f64::NEG_INFINITY);
        };
        let log_hr = apply(acg, id, locus, start, end)?;
        if log_hr.is_finite() {
            ensure_valid(acg, self.name())?;
        }
        Ok(log_hr)
    }
}

/// Moves the boundary between two neighbouring restricted conversions: the
/// end of the left one and the start of the right one shift together, so the
/// unconverted stretch between them keeps its length.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairBoundaryShift;

impl PairBoundaryShift {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }
}

impl Operator for PairBoundaryShift {
    fn name(&self) -> &'static str {
        "pair-boundary-shift"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        _ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        if acg.model() != ConversionModel::Restricted {
            log::debug!("{} needs the restricted model", self.name());
            return Ok(f64::NEG_INFINITY);
        }
        let locus = acg.choose_locus(rng);
        let convs = acg.conversions(locus);
        if convs.len() < 2 {
            return Ok(f64::NEG_INFINITY);
        }
        let idx = rng.uniform_index(convs.len() - 1);
        let (left, right) = (&convs[idx], &convs[idx + 1]);
        let shrink_left = left.end() - left.start();
        let shrink_right = right.end() - right.start();
        let offset = rng.uniform_index(shrink_left + shrink_right + 1) as isize - shrink_left as isize;
        if offset == 0 {
            return Ok(0.0);
        }
        let (left_id, left_start) = (left.id(), left.start());
        let (right_id, right_end) = (right.id(), right.end());
        let (Some(left_end), Some(right_start)) = (
            offset_site(left.end(), offset),
            offset_site(right.start(), offset),
        ) else {
            return Ok(f64::NEG_INFINITY);
        };

        // Move whichever boundary retreats first so the other never collides.
        if offset > 0 {
            acg.set_conversion_region(right_id, right_start, right_end)?;
            acg.set_conversion_region(left_id, left_start, left_end)?;
        } else {
            acg.set_conversion_region(left_id, left_start, left_end)?;
            acg.set_conversion_region(right_id, right_start, right_end)?;
        }
        ensure_valid(acg, self.name())?;
        Ok(0.0)
    }
}
