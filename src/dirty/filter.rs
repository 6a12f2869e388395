//! Filter-effect dirty expansion.
//!
//! Blur and similar filters sample pixels around their geometric footprint:
//! a damage rect that merely touches a filter's input region must also dirty
//! the filter's whole output footprint. Expansion runs to a fixed point so
//! that chained filters converge (filter A's expanded output may newly
//! overlap filter B's input).

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::NodeId;
use crate::geometry::Matrix;
use crate::region::Region;
use crate::scene::{ScreenDrawable, SurfaceDrawable};

/// One entry per render node carrying a background/foreground filter,
/// regenerated from the node tree every frame.
#[derive(Debug, Clone, Default)]
pub struct FilterDirtyRegionInfo {
    pub id: NodeId,
    /// Region used for overlap testing against the draw region.
    pub intersect_region: Region,
    /// Region merged into damage when the filter triggers.
    pub filter_dirty: Region,
    /// Pre-aligned variant of `filter_dirty`.
    pub aligned_filter_dirty: Region,
    /// Content below this filter in z-order; informs occlusion decisions.
    pub below_dirty: Region,
    /// The filter's background content produced no new dirty this frame.
    pub is_background_filter_clean: bool,
    /// Filter effects that read outside their cache (pixel stretch) must
    /// never take the partial-render shortcut.
    pub force_disable_partial_render: bool,
}

/// Per-manager list of filter entries plus the "pure clean" dirt produced by
/// triggered filters whose own background did not change. The HWC visible
/// dirty fast path drains that region once per frame.
#[derive(Debug, Clone, Default)]
pub struct FilterDirtyCollector {
    list: Vec<FilterDirtyRegionInfo>,
    pure_clean: Region,
}

impl FilterDirtyCollector {
    pub fn record(&mut self, info: FilterDirtyRegionInfo) {
        self.list.push(info);
    }

    pub fn list(&self) -> &[FilterDirtyRegionInfo] {
        &self.list
    }

    /// Drops all entries; called when the node tree regenerates the lists.
    pub fn clear(&mut self) {
        self.list.clear();
    }

    pub fn add_pure_clean_dirty(&mut self, region: &Region) {
        self.pure_clean.or_self(region);
    }

    pub fn take_pure_clean_dirty(&mut self) -> Region {
        std::mem::take(&mut self.pure_clean)
    }
}

/// Per-frame view of the filter-cache validity state. Built at the start of
/// damage aggregation and dropped at frame end, so no reset pass is needed.
#[derive(Debug, Clone, Copy)]
pub struct FilterCacheView<'a> {
    /// Partial render of cached filter content is valid this frame. Disabled
    /// globally while the screen is zoomed, since scaling invalidates caches.
    pub partial_render_allowed: bool,
    /// Filters whose cached content is known valid for occlusion purposes.
    pub valid_for_occlusion: &'a BTreeSet<NodeId>,
}

/// Expands `damage`/`draw` until no filter newly intersects the draw region.
///
/// Both regions only ever grow; the loop terminates because each pass either
/// triggers at least one previously untriggered filter or ends. Returns the
/// set of triggered filter node ids; callers discard it with the frame.
pub fn expand_filter_dirty(
    damage: &mut Region,
    draw: &mut Region,
    screen: &mut ScreenDrawable,
    surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
    order: &[NodeId],
    matrix: Option<&Matrix>,
    align: bool,
    cache: &FilterCacheView<'_>,
) -> BTreeSet<NodeId> {
    let mut triggered = BTreeSet::new();
    loop {
        let mut changed = false;

        let screen_frame_dirty = screen.dirty.is_current_frame_dirty();
        changed |= check_merge_filter_dirty(
            damage,
            draw,
            screen.dirty.filters_mut(),
            screen_frame_dirty,
            matrix,
            None,
            align,
            cache,
            &mut triggered,
        );

        for id in order {
            let Some(surface) = surfaces.get_mut(id) else {
                trace!(node = id.0, "filter dirty: surface drawable missing");
                continue;
            };
            if surface.params.visible_region.is_empty()
                || surface.params.occluded_by_filter_cache
            {
                continue;
            }
            let visible = surface.params.visible_region.clone();
            let frame_dirty = surface.dirty.is_current_frame_dirty();
            changed |= check_merge_filter_dirty(
                damage,
                draw,
                surface.dirty.filters_mut(),
                frame_dirty,
                matrix,
                Some(&visible),
                align,
                cache,
                &mut triggered,
            );
        }

        if !changed {
            break;
        }
    }
    triggered
}

#[allow(clippy::too_many_arguments)]
fn check_merge_filter_dirty(
    damage: &mut Region,
    draw: &mut Region,
    collector: &mut FilterDirtyCollector,
    manager_frame_dirty: bool,
    matrix: Option<&Matrix>,
    visible: Option<&Region>,
    align: bool,
    cache: &FilterCacheView<'_>,
    triggered: &mut BTreeSet<NodeId>,
) -> bool {
    let partial_render = !manager_frame_dirty && cache.partial_render_allowed;
    let mut changed = false;
    let mut pure_clean: Vec<Region> = Vec::new();

    for info in collector.list() {
        // Cached filter content still valid: skip expanding. Correctness is
        // backed by an independent occlusion check elsewhere.
        if partial_render
            && !info.force_disable_partial_render
            && cache.valid_for_occlusion.contains(&info.id)
        {
            trace!(filter = info.id.0, "partial render valid, skip dirty expanding");
            continue;
        }
        if triggered.contains(&info.id) {
            continue;
        }
        let mut intersect = match matrix {
            Some(m) => info.intersect_region.map(m),
            None => info.intersect_region.clone(),
        };
        if let Some(visible) = visible {
            intersect = intersect.and(visible);
        }
        if draw.and(&intersect).is_empty() {
            continue;
        }

        let dirty = match matrix {
            Some(m) => info.filter_dirty.map(m),
            None => info.filter_dirty.clone(),
        };
        let aligned = match matrix {
            Some(m) => info.aligned_filter_dirty.map(m),
            None => info.aligned_filter_dirty.clone(),
        };
        trace!(filter = info.id.0, "filter intersects draw region, dirty expanded");
        // Damage (GPU/codec ROI) takes the exact footprint; the draw region
        // (quick-reject) takes the aligned variant when alignment is on.
        damage.or_self(&dirty);
        draw.or_self(if align { &aligned } else { &dirty });
        // A triggered filter whose own background stayed clean is dirt the
        // HWC visible-dirty path would otherwise never see.
        if info.is_background_filter_clean {
            pure_clean.push(dirty);
        }
        triggered.insert(info.id);
        changed = true;
    }

    for dirty in &pure_clean {
        collector.add_pure_clean_dirty(dirty);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::scene::{ScreenDrawable, ScreenParams, SurfaceDrawable, SurfaceKind, SurfaceParams};
    use crate::screen::ScreenInfo;
    use crate::{NodeId, ScreenId};

    fn filter(id: u64, footprint: Rect) -> FilterDirtyRegionInfo {
        FilterDirtyRegionInfo {
            id: NodeId(id),
            intersect_region: Region::from(footprint),
            filter_dirty: Region::from(footprint),
            aligned_filter_dirty: Region::from(footprint).aligned(128),
            ..Default::default()
        }
    }

    fn screen_with_filters(filters: Vec<FilterDirtyRegionInfo>) -> ScreenDrawable {
        let mut screen = ScreenDrawable::new(
            ScreenId(1),
            ScreenParams::new(ScreenInfo::new(1080, 1920)),
        );
        for info in filters {
            screen.dirty.filters_mut().record(info);
        }
        screen
    }

    fn surface_with_filters(
        id: u64,
        visible: Rect,
        filters: Vec<FilterDirtyRegionInfo>,
    ) -> SurfaceDrawable {
        let mut params = SurfaceParams::new(SurfaceKind::Main);
        params.visible_region = Region::from(visible);
        let mut surface = SurfaceDrawable::new(NodeId(id), "surface", params);
        for info in filters {
            surface.dirty.filters_mut().record(info);
        }
        surface
    }

    fn run(
        damage: Rect,
        screen: &mut ScreenDrawable,
        surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
        order: &[NodeId],
    ) -> (Region, Region, BTreeSet<NodeId>) {
        let mut damage = Region::from(damage);
        let mut draw = damage.clone();
        let valid = BTreeSet::new();
        let cache = FilterCacheView { partial_render_allowed: false, valid_for_occlusion: &valid };
        let triggered =
            expand_filter_dirty(&mut damage, &mut draw, screen, surfaces, order, None, false, &cache);
        (damage, draw, triggered)
    }

    #[test]
    fn test_untouched_filter_does_not_expand() {
        let mut screen = screen_with_filters(vec![filter(10, Rect::new(500, 500, 100, 100))]);
        let mut surfaces = HashMap::new();
        let (damage, _, triggered) =
            run(Rect::new(0, 0, 50, 50), &mut screen, &mut surfaces, &[]);
        assert!(triggered.is_empty());
        assert_eq!(damage.area(), 50 * 50);
    }

    #[test]
    fn test_touched_filter_dirties_whole_footprint() {
        let mut screen = screen_with_filters(vec![filter(10, Rect::new(40, 40, 100, 100))]);
        let mut surfaces = HashMap::new();
        let (damage, draw, triggered) =
            run(Rect::new(0, 0, 50, 50), &mut screen, &mut surfaces, &[]);
        assert!(triggered.contains(&NodeId(10)));
        assert!(damage.covers(&Region::from(Rect::new(40, 40, 100, 100))));
        assert!(draw.covers(&Region::from(Rect::new(40, 40, 100, 100))));
    }

    #[test]
    fn test_chained_filters_converge() {
        // A touches the damage; B only touches A's output.
        let mut screen = screen_with_filters(vec![
            filter(1, Rect::new(40, 0, 100, 50)),
            filter(2, Rect::new(200, 0, 100, 50)),
        ]);
        // B overlaps A's footprint tail.
        screen.dirty.filters_mut().clear();
        screen.dirty.filters_mut().record(filter(1, Rect::new(40, 0, 200, 50)));
        screen.dirty.filters_mut().record(filter(2, Rect::new(220, 0, 100, 50)));
        let mut surfaces = HashMap::new();
        let (damage, _, triggered) =
            run(Rect::new(0, 0, 50, 50), &mut screen, &mut surfaces, &[]);
        assert!(triggered.contains(&NodeId(1)));
        assert!(triggered.contains(&NodeId(2)));
        assert!(damage.covers(&Region::from(Rect::new(220, 0, 100, 50))));
    }

    #[test]
    fn test_expansion_is_monotone() {
        let mut screen = screen_with_filters(vec![
            filter(1, Rect::new(40, 0, 100, 50)),
            filter(2, Rect::new(120, 0, 100, 50)),
        ]);
        let mut surfaces = HashMap::new();
        let input = Rect::new(0, 0, 50, 50);
        let (damage, draw, _) = run(input, &mut screen, &mut surfaces, &[]);
        assert!(damage.area() >= input.area());
        assert!(draw.area() >= input.area());
        assert!(damage.covers(&Region::from(input)));
    }

    #[test]
    fn test_surface_filter_clipped_by_visible_region() {
        let mut screen = screen_with_filters(vec![]);
        // Filter footprint intersects the damage, but the owning surface's
        // visible region excludes the overlap.
        let surface = surface_with_filters(
            5,
            Rect::new(500, 500, 100, 100),
            vec![filter(50, Rect::new(40, 40, 100, 100))],
        );
        let mut surfaces = HashMap::from([(NodeId(5), surface)]);
        let (_, _, triggered) =
            run(Rect::new(0, 0, 50, 50), &mut screen, &mut surfaces, &[NodeId(5)]);
        assert!(triggered.is_empty());
    }

    #[test]
    fn test_valid_cache_skips_expansion_until_dirty() {
        let mut screen = screen_with_filters(vec![filter(10, Rect::new(40, 40, 100, 100))]);
        let mut surfaces = HashMap::new();
        let mut damage = Region::from(Rect::new(0, 0, 50, 50));
        let mut draw = damage.clone();
        let valid = BTreeSet::from([NodeId(10)]);
        let cache = FilterCacheView { partial_render_allowed: true, valid_for_occlusion: &valid };
        let triggered = expand_filter_dirty(
            &mut damage, &mut draw, &mut screen, &mut surfaces, &[], None, false, &cache,
        );
        assert!(triggered.is_empty());
        assert_eq!(damage.area(), 50 * 50);

        // The same frame with screen-level dirt present must expand.
        screen.dirty.merge_dirty_rect(Rect::new(0, 0, 1, 1));
        let triggered = expand_filter_dirty(
            &mut damage, &mut draw, &mut screen, &mut surfaces, &[], None, false, &cache,
        );
        assert!(triggered.contains(&NodeId(10)));
    }

    #[test]
    fn test_clean_background_filter_accumulates_pure_clean_dirty() {
        let mut info = filter(10, Rect::new(40, 40, 100, 100));
        info.is_background_filter_clean = true;
        let mut screen = screen_with_filters(vec![info]);
        let mut surfaces = HashMap::new();
        let (_, _, triggered) =
            run(Rect::new(0, 0, 50, 50), &mut screen, &mut surfaces, &[]);
        assert!(triggered.contains(&NodeId(10)));
        let pure = screen.dirty.filters_mut().take_pure_clean_dirty();
        assert!(pure.covers(&Region::from(Rect::new(40, 40, 100, 100))));
        // Drained once per frame.
        assert!(screen.dirty.filters_mut().take_pure_clean_dirty().is_empty());
    }

    #[test]
    fn test_pixel_stretch_filter_ignores_cache_shortcut() {
        let mut info = filter(10, Rect::new(40, 40, 100, 100));
        info.force_disable_partial_render = true;
        let mut screen = screen_with_filters(vec![info]);
        let mut surfaces = HashMap::new();
        let mut damage = Region::from(Rect::new(0, 0, 50, 50));
        let mut draw = damage.clone();
        let valid = BTreeSet::from([NodeId(10)]);
        let cache = FilterCacheView { partial_render_allowed: true, valid_for_occlusion: &valid };
        let triggered = expand_filter_dirty(
            &mut damage, &mut draw, &mut screen, &mut surfaces, &[], None, false, &cache,
        );
        assert!(triggered.contains(&NodeId(10)));
    }
}
