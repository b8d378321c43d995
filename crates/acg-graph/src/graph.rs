use std::cell::OnceCell;

use serde::{Deserialize, Serialize};

use acg_core::errors::{AcgError, ErrorInfo};
use acg_core::rng::RngHandle;

use crate::cf_events::CfEventList;
use crate::conversion::Conversion;
use crate::frame::ClonalFrame;
use crate::ids::{ConversionId, NodeId};
use crate::locus::Locus;

/// Which conversion model the graph follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionModel {
    /// Converted regions within a locus may overlap freely.
    #[default]
    Unrestricted,
    /// Converted regions within a locus are disjoint and separated by at
    /// least one unconverted site.
    Restricted,
}

/// Clonal frame plus per-locus conversions ordered by start site.
#[derive(Debug, Clone)]
pub struct ConversionGraph {
    frame: ClonalFrame,
    loci: Vec<Locus>,
    conversions: Vec<Vec<Conversion>>,
    model: ConversionModel,
    whole_locus_mode: bool,
    next_id: u64,
    cf_events: OnceCell<CfEventList>,
}

impl ConversionGraph {
    /// Creates a graph without conversions.
    pub fn new(
        frame: ClonalFrame,
        loci: Vec<Locus>,
        model: ConversionModel,
    ) -> Result<Self, AcgError> {
        if loci.is_empty() {
            return Err(AcgError::Graph(
                ErrorInfo::new("no-loci", "a conversion graph needs at least one locus")
                    .with_hint("declare the loci before building the graph"),
            ));
        }
        frame.validate()?;
        let conversions = vec![Vec::new(); loci.len()];
        Ok(Self {
            frame,
            loci,
            conversions,
            model,
            whole_locus_mode: false,
            next_id: 0,
            cf_events: OnceCell::new(),
        })
    }

    /// Enables or disables whole-locus conversions.
    pub fn with_whole_locus_mode(mut self, enabled: bool) -> Self {
        self.whole_locus_mode = enabled;
        self
    }

    /// The clonal frame.
    pub fn frame(&self) -> &ClonalFrame {
        &self.frame
    }

    /// Mutable access to the clonal frame. Invalidates the cached events.
    pub fn frame_mut(&mut self) -> &mut ClonalFrame {
        self.cf_events.take();
        &mut self.frame
    }

    /// Memoised clonal frame events.
    pub fn cf_events(&self) -> &CfEventList {
        self.cf_events
            .get_or_init(|| CfEventList::from_frame(&self.frame))
    }

    /// Declared loci.
    pub fn loci(&self) -> &[Locus] {
        &self.loci
    }

    /// Locus at `idx`.
    pub fn locus(&self, idx: usize) -> Option<&Locus> {
        self.loci.get(idx)
    }

    /// Conversion model.
    pub fn model(&self) -> ConversionModel {
        self.model
    }

    /// Whether conversions always span whole loci.
    pub fn whole_locus_mode(&self) -> bool {
        self.whole_locus_mode
    }

    /// Total number of sites over all loci.
    pub fn total_sites(&self) -> usize {
        self.loci.iter().map(Locus::site_count).sum()
    }

    /// Sum of non-root clonal frame branch lengths.
    pub fn clonal_frame_length(&self) -> f64 {
        self.frame.total_length()
    }

    /// Root of the clonal frame.
    pub fn root(&self) -> NodeId {
        self.frame.root()
    }

    /// Conversions of one locus in start order.
    pub fn conversions(&self, locus: usize) -> &[Conversion] {
        self.conversions.get(locus).map_or(&[], Vec::as_slice)
    }

    /// Every conversion, locus by locus.
    pub fn all_conversions(&self) -> impl Iterator<Item = &Conversion> + '_ {
        self.conversions.iter().flatten()
    }

    /// Ids of every conversion, locus by locus.
    pub fn conversion_ids(&self) -> Vec<ConversionId> {
        self.all_conversions().map(Conversion::id).collect()
    }

    /// Total number of conversions.
    pub fn conversion_count(&self) -> usize {
        self.conversions.iter().map(Vec::len).sum()
    }

    /// Conversions in one locus.
    pub fn locus_conversion_count(&self, locus: usize) -> usize {
        self.conversions(locus).len()
    }

    /// Position `(locus, index)` of a conversion.
    pub fn position(&self, id: ConversionId) -> Option<(usize, usize)> {
        self.conversions.iter().enumerate().find_map(|(locus, list)| {
            list.iter()
                .position(|c| c.id() == id)
                .map(|idx| (locus, idx))
        })
    }

    /// Conversion by id.
    pub fn conversion(&self, id: ConversionId) -> Option<&Conversion> {
        let (locus, idx) = self.position(id)?;
        Some(&self.conversions[locus][idx])
    }

    /// Mutable conversion by id. Only endpoints may be edited through it.
    pub fn conversion_mut(&mut self, id: ConversionId) -> Option<&mut Conversion> {
        let (locus, idx) = self.position(id)?;
        Some(&mut self.conversions[locus][idx])
    }

    /// Conversion by global index, counting locus by locus.
    pub fn conversion_at(&self, mut index: usize) -> Option<&Conversion> {
        for list in &self.conversions {
            if index < list.len() {
                return Some(&list[index]);
            }
            index -= list.len();
        }
        None
    }

    /// Mutable endpoints of every conversion.
    pub fn conversions_mut(&mut self) -> impl Iterator<Item = &mut Conversion> + '_ {
        self.conversions.iter_mut().flatten()
    }

    pub(crate) fn frame_and_conversions_mut(&mut self) -> (&ClonalFrame, &mut [Vec<Conversion>]) {
        (&self.frame, &mut self.conversions)
    }

    /// Uniformly chosen conversion over all loci.
    pub fn choose_conversion(&self, rng: &mut RngHandle) -> Option<ConversionId> {
        let count = self.conversion_count();
        if count == 0 {
            return None;
        }
        self.conversion_at(rng.uniform_index(count))
            .map(Conversion::id)
    }

    /// Locus chosen with probability proportional to its site count.
    pub fn choose_locus(&self, rng: &mut RngHandle) -> usize {
        let weights: Vec<f64> = self.loci.iter().map(|l| l.site_count() as f64).collect();
        rng.weighted_index(&weights).unwrap_or(0)
    }

    /// Whether `[start, end]` can be owned by a conversion in `locus` under the
    /// graph's model, ignoring the conversion `skip`.
    pub fn region_is_free(
        &self,
        locus: usize,
        start: usize,
        end: usize,
        skip: Option<ConversionId>,
    ) -> bool {
        let Some(locus_def) = self.loci.get(locus) else {
            return false;
        };
        if start > end || end >= locus_def.site_count() {
            return false;
        }
        if self.model == ConversionModel::Unrestricted {
            return true;
        }
        self.conversions(locus)
            .iter()
            .filter(|c| Some(c.id()) != skip)
            .all(|c| end + 1 < c.start() || c.end() + 1 < start)
    }

    /// Inserts a conversion before the first conversion with a larger start.
    pub fn add_conversion(&mut self, mut conversion: Conversion) -> Result<ConversionId, AcgError> {
        let locus = conversion.locus();
        if !self.region_is_free(locus, conversion.start(), conversion.end(), None) {
            return Err(AcgError::Graph(
                ErrorInfo::new("region-unavailable", "conversion region cannot be inserted")
                    .with_context("locus", locus)
                    .with_context("start", conversion.start())
                    .with_context("end", conversion.end())
                    .with_context("model", format!("{:?}", self.model)),
            ));
        }
        let id = ConversionId::from_raw(self.next_id);
        self.next_id += 1;
        conversion.assign_id(id);
        let list = &mut self.conversions[locus];
        let idx = list.partition_point(|c| c.start() <= conversion.start());
        list.insert(idx, conversion);
        Ok(id)
    }

    /// Removes a conversion by identity.
    pub fn delete_conversion(&mut self, id: ConversionId) -> Result<Conversion, AcgError> {
        let (locus, idx) = self.position(id).ok_or_else(|| missing_conversion(id))?;
        Ok(self.conversions[locus].remove(idx))
    }

    /// Removes every conversion of a locus, returning them in start order.
    pub fn clear_locus(&mut self, locus: usize) -> Vec<Conversion> {
        self.conversions
            .get_mut(locus)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Updates a conversion's region and restores the start ordering.
    pub fn set_conversion_region(
        &mut self,
        id: ConversionId,
        start: usize,
        end: usize,
    ) -> Result<(), AcgError> {
        let (locus, idx) = self.position(id).ok_or_else(|| missing_conversion(id))?;
        if !self.region_is_free(locus, start, end, Some(id)) {
            return Err(AcgError::Graph(
                ErrorInfo::new("region-unavailable", "conversion region cannot be moved")
                    .with_context("conversion", id)
                    .with_context("start", start)
                    .with_context("end", end),
            ));
        }
        let list = &mut self.conversions[locus];
        let mut conversion = list.remove(idx);
        conversion.set_region(start, end);
        let at = list.partition_point(|c| c.start() <= start);
        list.insert(at, conversion);
        Ok(())
    }

    /// Checks every structural, conversion and ownership invariant.
    pub fn validate(&self) -> Result<(), AcgError> {
        self.frame.validate()?;
        if self.conversions.len() != self.loci.len() {
            return Err(AcgError::Graph(
                ErrorInfo::new("locus-mismatch", "conversion lists do not match loci")
                    .with_context("lists", self.conversions.len())
                    .with_context("loci", self.loci.len()),
            ));
        }
        for (locus, list) in self.conversions.iter().enumerate() {
            let site_count = self.loci[locus].site_count();
            for (idx, conv) in list.iter().enumerate() {
                self.validate_conversion(conv, locus, site_count)?;
                if let Some(next) = list.get(idx + 1) {
                    if next.start() < conv.start() {
                        return Err(conversion_error(
                            "start-order",
                            "conversions are not ordered by start site",
                            conv,
                        ));
                    }
                    if self.model == ConversionModel::Restricted && conv.end() + 1 >= next.start() {
                        return Err(AcgError::Graph(
                            conversion_info(
                                "restricted-overlap",
                                "restricted conversions must be separated by an unconverted site",
                                conv,
                            )
                            .with_context("next", next.id())
                            .with_context("next_start", next.start()),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_conversion(
        &self,
        conv: &Conversion,
        locus: usize,
        site_count: usize,
    ) -> Result<(), AcgError> {
        let node_count = self.frame.node_count();
        if conv.locus() != locus {
            return Err(conversion_error("locus-mismatch", "conversion filed under wrong locus", conv));
        }
        if conv.node1.index() >= node_count || conv.node2.index() >= node_count {
            return Err(conversion_error("unknown-node", "conversion endpoint out of range", conv));
        }
        if conv.start() > conv.end() || conv.end() >= site_count {
            return Err(conversion_error("site-range", "conversion sites outside the locus", conv));
        }
        if !(conv.height1.is_finite() && conv.height2.is_finite()) || conv.height1 > conv.height2 {
            return Err(conversion_error("height-order", "departure above arrival", conv));
        }
        if self.frame.is_root(conv.node1) {
            return Err(conversion_error("root-departure", "conversion departs from the root", conv));
        }
        if conv.height1 < self.frame.height(conv.node1)
            || self
                .frame
                .parent_height(conv.node1)
                .is_some_and(|h| conv.height1 > h)
        {
            return Err(conversion_error("departure-edge", "departure height outside node1 edge", conv));
        }
        if conv.height2 < self.frame.height(conv.node2)
            || self
                .frame
                .parent_height(conv.node2)
                .is_some_and(|h| conv.height2 > h)
        {
            return Err(conversion_error("arrival-edge", "arrival height outside node2 edge", conv));
        }
        Ok(())
    }

    /// Convenience wrapper around [`ConversionGraph::validate`].
    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(err) => {
                log::debug!("graph invalid: {err}");
                false
            }
        }
    }
}

fn missing_conversion(id: ConversionId) -> AcgError {
    AcgError::Graph(
        ErrorInfo::new("unknown-conversion", "conversion is not part of this graph")
            .with_context("conversion", id),
    )
}

fn conversion_info(code: &str, message: &str, conv: &Conversion) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("conversion", conv.id())
        .with_context("locus", conv.locus())
        .with_context("sites", format!("{}..={}", conv.start(), conv.end()))
        .with_context("node1", conv.node1)
        .with_context("height1", conv.height1)
        .with_context("node2", conv.node2)
        .with_context("height2", conv.height2)
}

fn conversion_error(code: &str, message: &str, conv: &Conversion) -> AcgError {
    AcgError::Graph(conversion_info(code, message, conv))
}
