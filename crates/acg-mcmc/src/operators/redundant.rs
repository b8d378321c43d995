use acg_core::errors::AcgError;
use acg_core::rng::RngHandle;
use acg_core::LOG_HALF;
use acg_graph::{Conversion, ConversionGraph, ConversionId, NodeId};

use super::{ensure_valid, Operator, ProposalContext};

const DEFAULT_WINDOW: f64 = 0.1;

/// Adds or removes a conversion that leaves a frame edge just below its top
/// and rejoins just above it, so that the marginal tree of its region matches
/// the clonal frame.
///
/// The edge is chosen uniformly among non-root nodes. Both endpoints lie
/// within a window of the coalescence closing the edge; the window is a
/// fraction of the root height.
#[derive(Debug, Clone, Copy)]
pub struct AddRemoveRedundantConversion {
    window: f64,
}

impl Default for AddRemoveRedundantConversion {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

/// Stretches of frame edge around one coalescence: the edge above the node,
/// capped at `max_len` (and of length `max_len` above the root), followed by
/// the capped edges of its children measured downwards.
struct Neighbourhood {
    node: NodeId,
    height: f64,
    above: f64,
    below: Vec<(NodeId, f64)>,
}

impl Neighbourhood {
    fn around(acg: &ConversionGraph, node: NodeId, max_len: f64) -> Self {
        let frame = acg.frame();
        let height = frame.height(node);
        let above = frame
            .parent_height(node)
            .map_or(max_len, |top| (top - height).min(max_len));
        let below = frame
            .children(node)
            .iter()
            .map(|&child| (child, frame.branch_length(child).min(max_len)))
            .collect();
        Self {
            node,
            height,
            above,
            below,
        }
    }

    fn total(&self) -> f64 {
        self.above + self.below.iter().map(|(_, len)| len).sum::<f64>()
    }

    /// Uniform point on the neighbourhood, as `(lineage, height)`.
    fn draw(&self, rng: &mut RngHandle) -> (NodeId, f64) {
        let mut u = rng.uniform() * self.total();
        if u < self.above {
            return (self.node, self.height + u);
        }
        u -= self.above;
        for &(child, len) in &self.below {
            if u < len {
                return (child, self.height - u);
            }
            u -= len;
        }
        (self.node, self.height)
    }

    fn contains(&self, acg: &ConversionGraph, node: NodeId, height: f64, max_len: f64) -> bool {
        let on_lineage = node == self.node || acg.frame().parent(node) == Some(self.node);
        on_lineage && (height - self.height).abs() < max_len
    }
}

fn draw_region(acg: &ConversionGraph, rng: &mut RngHandle) -> Option<(usize, usize, usize, f64)> {
    let locus = rng.uniform_index(acg.loci().len());
    let sites = acg.locus(locus)?.site_count();
    let mut log_p = -(acg.loci().len() as f64).ln();
    if acg.whole_locus_mode() {
        return Some((locus, 0, sites - 1, log_p));
    }
    let a = rng.uniform_index(sites);
    let b = rng.uniform_index(sites);
    log_p -= 2.0 * (sites as f64).ln();
    if a != b {
        log_p -= LOG_HALF;
    }
    Some((locus, a.min(b), a.max(b), log_p))
}

fn region_log_p(acg: &ConversionGraph, conv: &Conversion) -> f64 {
    let mut log_p = -(acg.loci().len() as f64).ln();
    if acg.whole_locus_mode() {
        return log_p;
    }
    let sites = acg.locus(conv.locus()).map_or(1, |l| l.site_count());
    log_p -= 2.0 * (sites as f64).ln();
    if conv.start() != conv.end() {
        log_p -= LOG_HALF;
    }
    log_p
}

impl AddRemoveRedundantConversion {
    /// `window` bounds the distance of each endpoint from the coalescence,
    /// as a fraction of the root height.
    pub fn new(window: f64) -> Self {
        Self { window }
    }

    fn redundant(
        acg: &ConversionGraph,
        lower: &Neighbourhood,
        upper: &Neighbourhood,
        max_len: f64,
    ) -> Vec<ConversionId> {
        acg.all_conversions()
            .filter(|c| {
                lower.contains(acg, c.node1, c.height1, max_len)
                    && upper.contains(acg, c.node2, c.height2, max_len)
            })
            .map(|c| c.id())
            .collect()
    }

    /// Forward and reverse proposal densities of `id`, summed over every
    /// edge whose neighbourhoods hold both of its endpoints. The shared
    /// edge-choice and coin factors cancel and are left out.
    fn mixture_densities(
        acg: &ConversionGraph,
        id: ConversionId,
        max_len: f64,
    ) -> Option<(f64, f64)> {
        let conv = acg.conversion(id)?;
        let frame = acg.frame();
        let (mut forward, mut reverse) = (0.0, 0.0);
        for node in frame.non_root_nodes() {
            let Some(parent) = frame.parent(node) else {
                continue;
            };
            let lower = Neighbourhood::around(acg, node, max_len);
            let upper = Neighbourhood::around(acg, parent, max_len);
            if !lower.contains(acg, conv.node1, conv.height1, max_len)
                || !upper.contains(acg, conv.node2, conv.height2, max_len)
            {
                continue;
            }
            forward += 1.0 / (lower.total() * upper.total());
            reverse += 1.0 / Self::redundant(acg, &lower, &upper, max_len).len() as f64;
        }
        (forward > 0.0).then_some((forward, reverse))
    }

    fn add(
        acg: &mut ConversionGraph,
        lower: &Neighbourhood,
        upper: &Neighbourhood,
        max_len: f64,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let (node1, height1) = lower.draw(rng);
        let (node2, height2) = upper.draw(rng);
        if height1 > height2 {
            return Ok(f64::NEG_INFINITY);
        }
        let Some((locus, start, end, region_p)) = draw_region(acg, rng) else {
            return Ok(f64::NEG_INFINITY);
        };
        if !acg.region_is_free(locus, start, end, None) {
            return Ok(f64::NEG_INFINITY);
        }
        let id = acg.add_conversion(Conversion::new(
            locus, start, end, node1, height1, node2, height2,
        ))?;
        let Some((forward, reverse)) = Self::mixture_densities(acg, id, max_len) else {
            return Ok(f64::NEG_INFINITY);
        };
        Ok(reverse.ln() - forward.ln() - region_p)
    }

    fn remove(
        acg: &mut ConversionGraph,
        lower: &Neighbourhood,
        upper: &Neighbourhood,
        max_len: f64,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let candidates = Self::redundant(acg, lower, upper, max_len);
        if candidates.is_empty() {
            return Ok(f64::NEG_INFINITY);
        }
        let id = candidates[rng.uniform_index(candidates.len())];
        let Some((forward, reverse)) = Self::mixture_densities(acg, id, max_len) else {
            return Ok(f64::NEG_INFINITY);
        };
        let Some(conv) = acg.conversion(id) else {
            return Ok(f64::NEG_INFINITY);
        };
        let log_hr = forward.ln() - reverse.ln() + region_log_p(acg, conv);
        acg.delete_conversion(id)?;
        Ok(log_hr)
    }
}

impl Operator for AddRemoveRedundantConversion {
    fn name(&self) -> &'static str {
        "add-remove-redundant-conversion"
    }

    fn proposal(
        &mut self,
        acg: &mut ConversionGraph,
        _ctx: &ProposalContext<'_>,
        rng: &mut RngHandle,
    ) -> Result<f64, AcgError> {
        let frame = acg.frame();
        let nodes: Vec<NodeId> = frame.non_root_nodes().collect();
        if nodes.is_empty() {
            return Ok(f64::NEG_INFINITY);
        }
        let node = nodes[rng.uniform_index(nodes.len())];
        let Some(parent) = frame.parent(node) else {
            return Ok(f64::NEG_INFINITY);
        };
        let max_len = self.window * frame.height(frame.root());
        let lower = Neighbourhood::around(acg, node, max_len);
        let upper = Neighbourhood::around(acg, parent, max_len);

        let log_hr = if rng.coin() {
            Self::add(acg, &lower, &upper, max_len, rng)?
        } else {
            Self::remove(acg, &lower, &upper, max_len, rng)?
        };
        if log_hr == f64::NEG_INFINITY {
            log::debug!("{} rejected", self.name());
            return Ok(log_hr);
        }
        ensure_valid(acg, self.name())?;
        Ok(log_hr)
    }
}
