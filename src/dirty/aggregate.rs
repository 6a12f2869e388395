//! Per-screen damage aggregation.
//!
//! Entry points called once per screen per frame: [`DamageAggregator::merge_dirty_history`]
//! for direct (real) screens and [`DamageAggregator::merge_dirty_history_in_virtual`]
//! for mirror/expand targets. Surface histories merge first, then the merge
//! policy and fragmentation fallback shape the rect list, then sampling maps
//! it into target space, and filter expansion runs last so it sees final
//! target coordinates.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::config::{AdvancedDirtyPolicy, DirtyRegionConfig};
use crate::dirty::filter::{FilterCacheView, expand_filter_dirty};
use crate::dirty::merge::RectsMerger;
use crate::geometry::{Rect, scale_translate};
use crate::region::{GraphicsOrigin, Region, screen_intersect_dirty_rects};
use crate::scene::{FrameParams, ScreenDrawable, SpecialLayerFlags, SurfaceDrawable, SurfaceKind};
use crate::screen::ScreenInfo;
use crate::NodeId;

pub struct DamageAggregator<'a> {
    config: &'a DirtyRegionConfig,
    origin: GraphicsOrigin,
}

impl<'a> DamageAggregator<'a> {
    pub fn new(config: &'a DirtyRegionConfig, origin: GraphicsOrigin) -> Self {
        Self { config, origin }
    }

    /// Direct-screen damage merge. Returns the codec-origin damage rect list;
    /// never empty, an all-clean frame yields the single zero-area sentinel
    /// (an empty list would read as "no ROI restriction" downstream).
    pub fn merge_dirty_history(
        &self,
        screen: &mut ScreenDrawable,
        surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
        buffer_age: usize,
        frame: &FrameParams,
    ) -> Vec<Rect> {
        let align = self.config.align_enabled;
        let grid = self.config.alignment_size;

        // Surface histories merge strictly before any filter or sampling work.
        let order: Vec<NodeId> = screen.params.surfaces.iter().rev().copied().collect();
        for id in &order {
            let Some(surface) = surfaces.get_mut(id) else {
                trace!(node = id.0, "dirty merge: surface drawable missing");
                continue;
            };
            if !surface.params.kind.is_leash_or_main() {
                continue;
            }
            if surface.params.is_first_level_cross_node && !frame.first_visit_cross_node_display {
                trace!(node = id.0, "cross-screen surface counted on its first-visit screen");
                continue;
            }
            // Hardware-composed layers report their dirty out of band.
            let hwc = surface.dirty.hwc_dirty_region();
            surface.dirty.merge_dirty_rect(hwc);
            let typed: Vec<Rect> = surface.dirty.type_hwc_dirty_region().values().copied().collect();
            for rect in typed {
                surface.dirty.merge_dirty_rect(rect);
            }
            if !surface.params.old_dirty_in_surface.is_empty() {
                surface.dirty.intersect_dirty_rect(surface.params.old_dirty_in_surface);
            }
            surface.dirty.set_buffer_age(buffer_age);
            surface.dirty.update_dirty(align, grid);
        }
        screen.dirty.set_buffer_age(buffer_age);
        screen.dirty.update_dirty(align, grid);

        let display_region = match self.config.policy {
            AdvancedDirtyPolicy::Disabled => Region::from(screen.dirty.dirty_region()),
            _ => Region::from_rects(screen.dirty.advanced_dirty_region().iter().copied()),
        };

        let mut surface_region = Region::new();
        for id in &order {
            let Some(surface) = surfaces.get(id) else {
                continue;
            };
            if !surface.params.kind.is_leash_or_main() {
                continue;
            }
            if surface.params.is_first_level_cross_node && !frame.first_visit_cross_node_display {
                continue;
            }
            let dirty = match self.config.policy {
                AdvancedDirtyPolicy::Disabled => Region::from(surface.dirty.dirty_region()),
                _ => Region::from_rects(surface.dirty.advanced_dirty_region().iter().copied()),
            };
            surface_region.or_self(&dirty.and(&surface.params.visible_region));
        }
        screen.params.main_and_leash_surface_dirty = !surface_region.is_empty();

        let merger = RectsMerger::new(
            self.config.max_merging_rects,
            self.config.expected_output_rects,
            self.config.max_merge_cost,
        );
        let mut damage = match self.config.policy {
            AdvancedDirtyPolicy::Disabled => surface_region.or(&display_region),
            AdvancedDirtyPolicy::SurfaceAndDisplay => {
                merger.merge_all_rects(&surface_region.or(&display_region))
            }
            AdvancedDirtyPolicy::DisplayOnly => {
                merger.merge_all_rects(&display_region).or(&surface_region)
            }
        };

        // Fragmented regions covering most of their bound cost more in clip
        // setup than the pixels they skip.
        if !align && self.config.clip_rect_threshold < 1.0 && damage.len() > 1 {
            let bound = damage.bound();
            if damage.area() as f32 > bound.area() as f32 * self.config.clip_rect_threshold {
                debug!(rects = damage.len(), "fragmented damage collapsed to bounding rect");
                damage = Region::from(bound);
            }
        }

        let info = screen.params.screen_info.clone();
        screen.params.drawn_region = damage.clone();
        let sampling_on = info.is_sampling_on && (info.sampling_scale - 1.0).abs() > f32::EPSILON;
        if sampling_on {
            let (sampled, drawn) = self.expand_for_sampling(&damage, &info);
            damage = sampled;
            screen.params.drawn_region = drawn;
        }

        // Filter expansion sees the final, already-sampled damage region.
        let sampling_matrix = sampling_on.then(|| {
            scale_translate(info.sampling_scale, info.sampling_translate_x, info.sampling_translate_y)
        });
        let cache = FilterCacheView {
            partial_render_allowed: !screen.params.zoomed,
            valid_for_occlusion: &frame.filter_cache_valid_for_occlusion,
        };
        let filter_order = screen.params.surfaces.clone();
        let mut draw = damage.clone();
        expand_filter_dirty(
            &mut damage,
            &mut draw,
            screen,
            surfaces,
            &filter_order,
            sampling_matrix.as_ref(),
            align,
            &cache,
        );
        if frame.op_dropped {
            screen.dirty.set_quick_reject_rects(draw.into_rects());
        }

        let mut rects = screen_intersect_dirty_rects(&damage, info.rotated_height(), self.origin);
        if rects.is_empty() {
            rects.push(Rect::ZERO);
        }
        screen.damage_region = rects.clone();
        rects
    }

    /// Mirror/expand merge: only app-window surfaces contribute, capture
    /// exclusion lists apply, and the screen's own buffer-relative dirty gets
    /// a second origin flip. Returns the merged region in source space; the
    /// caller maps it through the mirror transform.
    pub fn merge_dirty_history_in_virtual(
        &self,
        screen: &mut ScreenDrawable,
        surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
        buffer_age: usize,
        black_list: &BTreeSet<NodeId>,
        type_black_list: &BTreeSet<SurfaceKind>,
    ) -> Region {
        let mut damage = Region::new();
        let order: Vec<NodeId> = screen.params.surfaces.iter().rev().copied().collect();
        for id in &order {
            let Some(surface) = surfaces.get_mut(id) else {
                trace!(node = id.0, "virtual dirty merge: surface drawable missing");
                continue;
            };
            if !surface.params.is_app_window {
                continue;
            }
            if black_list.contains(id) || type_black_list.contains(&surface.params.kind) {
                trace!(node = id.0, "black-listed surface excluded from virtual dirty");
                continue;
            }
            if surface.params.special_layers.contains(SpecialLayerFlags::SKIP) {
                continue;
            }
            surface.dirty.merge_dirty_history_in_virtual(buffer_age);
            let dirty = Region::from(surface.dirty.dirty_region_in_virtual());
            damage.or_self(&dirty.and(&surface.params.visible_region_in_virtual));
        }

        // The screen's own dirty is buffer-relative, flip it before merging.
        screen.dirty.merge_dirty_history_in_virtual(buffer_age);
        let own = screen.dirty.dirty_region_in_virtual();
        damage.or_rect(&screen.dirty.rect_flip_within_surface(own, self.origin));
        damage
    }

    /// Maps a target-origin damage region into sampled space, outset by the
    /// sampling kernel radius, and inverse-maps the expansion back so the
    /// drawn region stays source-space correct.
    pub fn expand_for_sampling(&self, damage: &Region, info: &ScreenInfo) -> (Region, Region) {
        let matrix =
            scale_translate(info.sampling_scale, info.sampling_translate_x, info.sampling_translate_y);
        let sampled = Region::from_rects(
            damage.map(&matrix).rects().iter().map(|r| r.outset(info.sampling_distance)),
        );
        let drawn = match matrix.inverse() {
            Some(inverse) => sampled.map(&inverse),
            None => damage.clone(),
        };
        (sampled, drawn)
    }

    /// Whether a dirty-free virtual expand screen may skip composition this
    /// frame. Consumes the accumulated skip state when drawing resumes.
    pub fn check_virtual_expand_screen_skip(
        &self,
        screen: &mut ScreenDrawable,
        surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
        black_list: &BTreeSet<NodeId>,
        type_black_list: &BTreeSet<SurfaceKind>,
    ) -> bool {
        if !self.config.expand_screen_skip_enabled {
            return false;
        }
        let has_dirty =
            check_current_frame_has_dirty_in_virtual(screen, surfaces, black_list, type_black_list)
                || screen.params.accumulated_dirty
                || screen.params.accumulated_hdr_status_changed
                || screen.params.accumulated_special_layer_changed
                || screen.params.hdr_status_changed
                || screen.params.has_mirrored_screen_changed;
        if !has_dirty {
            return true;
        }
        screen.params.accumulated_dirty = false;
        screen.params.accumulated_hdr_status_changed = false;
        screen.params.accumulated_special_layer_changed = false;
        if screen.accumulate_dirty_in_skip_frame {
            screen.accumulate_dirty_in_skip_frame = false;
            for id in &screen.params.surfaces {
                if let Some(surface) = surfaces.get_mut(id) {
                    surface.dirty.merge_expand_accumulated_dirty();
                    surface.dirty.clear_expand_accumulated_dirty();
                }
            }
            screen.dirty.merge_expand_accumulated_dirty();
            screen.dirty.clear_expand_accumulated_dirty();
        }
        false
    }
}

/// HWC fast path: whether anything visibly changed on the screen this frame.
/// Drains each surface's pure-clean filter dirt as part of the check.
pub fn current_frame_visible_dirty(
    screen: &mut ScreenDrawable,
    surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
) -> bool {
    if screen.dirty.is_current_frame_dirty() {
        return true;
    }
    let mut found = false;
    for id in &screen.params.surfaces {
        let Some(surface) = surfaces.get_mut(id) else {
            continue;
        };
        if surface.params.visible_region.is_empty() {
            continue;
        }
        let mut dirty = Region::from(surface.dirty.current_frame_dirty());
        dirty.or_rect(&surface.dirty.hwc_dirty_region());
        for rect in surface.dirty.type_hwc_dirty_region().values() {
            dirty.or_rect(rect);
        }
        dirty.or_self(&surface.dirty.filters_mut().take_pure_clean_dirty());
        if !dirty.and(&surface.params.visible_region).is_empty() {
            found = true;
        }
    }
    found
}

/// Like [`current_frame_visible_dirty`] but for mirror targets: app windows
/// only, capture exclusion lists applied, visibility tested in virtual space.
pub fn check_current_frame_has_dirty_in_virtual(
    screen: &ScreenDrawable,
    surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
    black_list: &BTreeSet<NodeId>,
    type_black_list: &BTreeSet<SurfaceKind>,
) -> bool {
    if screen.dirty.is_current_frame_dirty() {
        return true;
    }
    for id in &screen.params.surfaces {
        let Some(surface) = surfaces.get_mut(id) else {
            continue;
        };
        if !surface.params.is_app_window
            || black_list.contains(id)
            || type_black_list.contains(&surface.params.kind)
        {
            continue;
        }
        let mut dirty = Region::from(surface.dirty.current_frame_dirty());
        dirty.or_rect(&surface.dirty.hwc_dirty_region());
        if !dirty.and(&surface.params.visible_region_in_virtual).is_empty() {
            return true;
        }
    }
    false
}

/// Stashes this frame's dirty on a skipping expand screen so the backlog
/// replays when composition resumes.
pub fn accumulate_dirty_state(
    screen: &mut ScreenDrawable,
    surfaces: &mut HashMap<NodeId, SurfaceDrawable>,
) {
    screen.params.accumulated_hdr_status_changed |= screen.params.hdr_status_changed;
    screen.params.accumulated_special_layer_changed |= screen.params.has_mirrored_screen_changed;
    let rect = screen.dirty.current_frame_dirty();
    screen.dirty.accumulate_expand_dirty(rect);
    for id in &screen.params.surfaces {
        if let Some(surface) = surfaces.get_mut(id) {
            let rect = surface.dirty.current_frame_dirty();
            surface.dirty.accumulate_expand_dirty(rect);
        }
    }
    screen.accumulate_dirty_in_skip_frame = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScreenId;
    use crate::scene::{ScreenParams, SurfaceParams};

    fn screen(width: u32, height: u32, surface_ids: &[u64]) -> ScreenDrawable {
        let mut params = ScreenParams::new(ScreenInfo::new(width, height));
        params.surfaces = surface_ids.iter().map(|&id| NodeId(id)).collect();
        ScreenDrawable::new(ScreenId(1), params)
    }

    fn app_surface(id: u64, dst: Rect) -> SurfaceDrawable {
        let mut params = SurfaceParams::new(SurfaceKind::Main);
        params.dst_rect = dst;
        params.visible_region = Region::from(dst);
        params.visible_region_in_virtual = Region::from(dst);
        SurfaceDrawable::new(NodeId(id), format!("surface{id}"), params)
    }

    fn config() -> DirtyRegionConfig {
        DirtyRegionConfig::default()
    }

    #[test]
    fn test_empty_damage_yields_zero_rect_sentinel() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::BottomLeft);
        let mut screen = screen(1080, 1920, &[]);
        let mut surfaces = HashMap::new();
        let rects =
            aggregator.merge_dirty_history(&mut screen, &mut surfaces, 1, &FrameParams::default());
        assert_eq!(rects, vec![Rect::ZERO]);
        assert_eq!(screen.damage_region, vec![Rect::ZERO]);
    }

    #[test]
    fn test_surface_dirty_flows_through_with_origin_flip() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::BottomLeft);
        let mut screen = screen(1080, 1920, &[7]);
        let mut surfaces = HashMap::from([(NodeId(7), app_surface(7, Rect::new(0, 0, 1080, 1920)))]);
        surfaces
            .get_mut(&NodeId(7))
            .unwrap()
            .dirty
            .merge_dirty_rect(Rect::from_ltrb(10, 20, 110, 220));
        let rects =
            aggregator.merge_dirty_history(&mut screen, &mut surfaces, 1, &FrameParams::default());
        assert_eq!(rects, vec![Rect::new(10, 1700, 100, 200)]);
    }

    #[test]
    fn test_invalid_buffer_age_forces_full_screen() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::TopLeft);
        let mut screen = screen(1080, 1920, &[]);
        let mut surfaces = HashMap::new();
        let rects =
            aggregator.merge_dirty_history(&mut screen, &mut surfaces, 0, &FrameParams::default());
        assert_eq!(rects, vec![Rect::new(0, 0, 1080, 1920)]);
    }

    #[test]
    fn test_cross_screen_surface_skipped_outside_first_visit() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::TopLeft);
        let mut screen = screen(1080, 1920, &[7]);
        let mut surface = app_surface(7, Rect::new(0, 0, 500, 500));
        surface.params.is_first_level_cross_node = true;
        surface.dirty.merge_dirty_rect(Rect::new(0, 0, 100, 100));
        let mut surfaces = HashMap::from([(NodeId(7), surface)]);

        let frame = FrameParams::default();
        let rects = aggregator.merge_dirty_history(&mut screen, &mut surfaces, 1, &frame);
        // Not this screen's first visit: the surface contributes nothing.
        assert_eq!(rects, vec![Rect::ZERO]);

        let frame = FrameParams { first_visit_cross_node_display: true, ..Default::default() };
        surfaces.get_mut(&NodeId(7)).unwrap().dirty.merge_dirty_rect(Rect::new(0, 0, 100, 100));
        let rects = aggregator.merge_dirty_history(&mut screen, &mut surfaces, 1, &frame);
        assert!(rects.iter().any(|r| !r.is_empty()));
    }

    #[test]
    fn test_hwc_dirty_merged_into_damage() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::TopLeft);
        let mut screen = screen(1080, 1920, &[7]);
        let mut surface = app_surface(7, Rect::new(0, 0, 1080, 1920));
        surface.dirty.merge_hwc_dirty_rect(Rect::new(100, 100, 50, 50));
        let mut surfaces = HashMap::from([(NodeId(7), surface)]);
        let rects =
            aggregator.merge_dirty_history(&mut screen, &mut surfaces, 1, &FrameParams::default());
        assert_eq!(rects, vec![Rect::new(100, 100, 50, 50)]);
    }

    #[test]
    fn test_display_only_policy_keeps_surface_rects_unmerged() {
        let mut cfg = config();
        cfg.policy = AdvancedDirtyPolicy::DisplayOnly;
        cfg.clip_rect_threshold = 1.0;
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::TopLeft);
        let mut screen = screen(1080, 1920, &[7]);
        let mut surface = app_surface(7, Rect::new(0, 0, 1080, 1920));
        surface.dirty.merge_dirty_rect(Rect::new(0, 0, 10, 10));
        surface.dirty.merge_dirty_rect(Rect::new(500, 500, 10, 10));
        let mut surfaces = HashMap::from([(NodeId(7), surface)]);
        let rects =
            aggregator.merge_dirty_history(&mut screen, &mut surfaces, 1, &FrameParams::default());
        assert_eq!(rects.len(), 2);
    }

    #[test]
    fn test_fragmented_damage_collapses_above_threshold() {
        let mut cfg = config();
        cfg.policy = AdvancedDirtyPolicy::DisplayOnly;
        cfg.clip_rect_threshold = 0.5;
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::TopLeft);
        let mut screen = screen(1080, 1920, &[7]);
        let mut surface = app_surface(7, Rect::new(0, 0, 1080, 1920));
        // Two abutting halves of a 200x100 bound cover 100% of it.
        surface.dirty.merge_dirty_rect(Rect::new(0, 0, 100, 100));
        surface.dirty.merge_dirty_rect(Rect::new(100, 0, 100, 50));
        let mut surfaces = HashMap::from([(NodeId(7), surface)]);
        let rects =
            aggregator.merge_dirty_history(&mut screen, &mut surfaces, 1, &FrameParams::default());
        assert_eq!(rects, vec![Rect::new(0, 0, 200, 100)]);
    }

    #[test]
    fn test_sampling_maps_damage_and_keeps_drawn_region_in_source_space() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::TopLeft);
        let mut screen = screen(1080, 1920, &[7]);
        screen.params.screen_info.is_sampling_on = true;
        screen.params.screen_info.sampling_scale = 0.5;
        screen.params.screen_info.sampling_distance = 2;
        let mut surface = app_surface(7, Rect::new(0, 0, 1080, 1920));
        surface.dirty.merge_dirty_rect(Rect::new(100, 100, 200, 200));
        let mut surfaces = HashMap::from([(NodeId(7), surface)]);
        let rects =
            aggregator.merge_dirty_history(&mut screen, &mut surfaces, 1, &FrameParams::default());
        // 100..300 scaled by 0.5 then outset by the kernel radius.
        assert_eq!(rects, vec![Rect::from_ltrb(48, 48, 152, 152)]);
        // Drawn region inverse-maps back over the source rect.
        assert!(screen.params.drawn_region.covers(&Region::from(Rect::new(100, 100, 200, 200))));
    }

    #[test]
    fn test_virtual_merge_excludes_black_listed_surfaces() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::TopLeft);
        let mut screen = screen(1080, 1920, &[7, 8]);
        let mut surfaces = HashMap::from([
            (NodeId(7), app_surface(7, Rect::new(0, 0, 500, 500))),
            (NodeId(8), app_surface(8, Rect::new(500, 500, 500, 500))),
        ]);
        for surface in surfaces.values_mut() {
            let dst = surface.dirty.surface_rect();
            surface.dirty.merge_dirty_rect(dst);
            surface.dirty.set_buffer_age(1);
            surface.dirty.update_dirty(false, 0);
        }
        // A clean screen history frame keeps the screen's own contribution empty.
        screen.dirty.set_buffer_age(1);
        screen.dirty.update_dirty(false, 0);
        let black = BTreeSet::from([NodeId(8)]);
        let merged = aggregator.merge_dirty_history_in_virtual(
            &mut screen,
            &mut surfaces,
            1,
            &black,
            &BTreeSet::new(),
        );
        assert!(merged.covers(&Region::from(Rect::new(0, 0, 500, 500))));
        assert!(!merged.intersects_rect(&Rect::new(500, 500, 500, 500)));
    }

    #[test]
    fn test_virtual_merge_excludes_skip_layers_and_types() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::TopLeft);
        let mut screen = screen(1080, 1920, &[7, 8]);
        let mut skip = app_surface(7, Rect::new(0, 0, 500, 500));
        skip.params.special_layers |= SpecialLayerFlags::SKIP;
        let cursor = {
            let mut params = SurfaceParams::new(SurfaceKind::Cursor);
            params.is_app_window = true;
            params.dst_rect = Rect::new(500, 0, 100, 100);
            params.visible_region_in_virtual = Region::from(params.dst_rect);
            SurfaceDrawable::new(NodeId(8), "cursor", params)
        };
        let mut surfaces = HashMap::from([(NodeId(7), skip), (NodeId(8), cursor)]);
        for surface in surfaces.values_mut() {
            let dst = surface.dirty.surface_rect();
            surface.dirty.merge_dirty_rect(dst);
            surface.dirty.set_buffer_age(1);
            surface.dirty.update_dirty(false, 0);
        }
        screen.dirty.set_buffer_age(1);
        screen.dirty.update_dirty(false, 0);
        let types = BTreeSet::from([SurfaceKind::Cursor]);
        let merged = aggregator.merge_dirty_history_in_virtual(
            &mut screen,
            &mut surfaces,
            1,
            &BTreeSet::new(),
            &types,
        );
        assert!(merged.is_empty());
    }

    #[test]
    fn test_virtual_merge_flips_screen_own_dirty() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::BottomLeft);
        let mut screen = screen(1080, 1920, &[]);
        screen.dirty.merge_dirty_rect(Rect::from_ltrb(10, 20, 110, 220));
        screen.dirty.set_buffer_age(1);
        screen.dirty.update_dirty(false, 0);
        let merged = aggregator.merge_dirty_history_in_virtual(
            &mut screen,
            &mut HashMap::new(),
            1,
            &BTreeSet::new(),
            &BTreeSet::new(),
        );
        assert_eq!(merged.rects(), &[Rect::new(10, 1700, 100, 200)]);
    }

    #[test]
    fn test_expand_screen_skip_and_backlog_replay() {
        let cfg = config();
        let aggregator = DamageAggregator::new(&cfg, GraphicsOrigin::TopLeft);
        let mut screen = screen(1080, 1920, &[7]);
        let mut surfaces = HashMap::from([(NodeId(7), app_surface(7, Rect::new(0, 0, 500, 500)))]);
        let empty = BTreeSet::new();
        let no_types = BTreeSet::new();

        // Clean frame skips.
        assert!(aggregator.check_virtual_expand_screen_skip(
            &mut screen,
            &mut surfaces,
            &empty,
            &no_types
        ));
        accumulate_dirty_state(&mut screen, &mut surfaces);

        // Next frame brings dirty; the skip state is consumed.
        surfaces.get_mut(&NodeId(7)).unwrap().dirty.merge_dirty_rect(Rect::new(0, 0, 10, 10));
        assert!(!aggregator.check_virtual_expand_screen_skip(
            &mut screen,
            &mut surfaces,
            &empty,
            &no_types
        ));
        assert!(!screen.accumulate_dirty_in_skip_frame);
    }

    #[test]
    fn test_current_frame_visible_dirty_requires_visibility() {
        let mut screen = screen(1080, 1920, &[7]);
        let mut surface = app_surface(7, Rect::new(0, 0, 500, 500));
        surface.params.visible_region = Region::from(Rect::new(0, 0, 100, 100));
        surface.dirty.merge_dirty_rect(Rect::new(200, 200, 50, 50));
        let mut surfaces = HashMap::from([(NodeId(7), surface)]);
        assert!(!current_frame_visible_dirty(&mut screen, &mut surfaces));
        surfaces.get_mut(&NodeId(7)).unwrap().dirty.merge_dirty_rect(Rect::new(50, 50, 10, 10));
        assert!(current_frame_visible_dirty(&mut screen, &mut surfaces));
    }
}
