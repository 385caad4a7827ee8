//! Marching-squares boundary tracing on binary masks.
//!
//! Contours are traced at the 0.5 isocontour between pixel centers, with
//! the low positive-orientation convention: every contour winds the same
//! way around foreground, so downstream polygon construction never needs
//! an orientation check. Callers pad the mask with a one-pixel background
//! collar first, which guarantees every contour closes instead of being
//! clipped at the raster edge.

use std::collections::HashMap;

/// Point in (row, col) order, matching the mask's array axes.
pub(crate) type ContourPoint = (f64, f64);

/// Trace all closed 0.5-level contours of a row-major binary mask.
///
/// All vertices lie on half-pixel edge crossings. A mask may yield zero,
/// one or several contours (disjoint regions, or a hole inside a region).
/// Each returned ring repeats its first point at the end.
pub(crate) fn find_contours(mask: &[bool], width: usize, height: usize) -> Vec<Vec<ContourPoint>> {
    debug_assert_eq!(mask.len(), width * height);
    if width < 2 || height < 2 {
        return Vec::new();
    }

    let at = |r: usize, c: usize| mask[r * width + c];

    // Half-pixel coordinates are exact multiples of 0.5; doubling them
    // gives an exact integer key for chaining.
    let key = |p: ContourPoint| ((p.0 * 2.0) as i64, (p.1 * 2.0) as i64);

    // Directed segments per 2x2 cell. Foreground stays on a fixed side of
    // the travel direction, so chained segments share one orientation.
    let mut starts: Vec<ContourPoint> = Vec::new();
    let mut ends: Vec<ContourPoint> = Vec::new();
    let mut by_start: HashMap<(i64, i64), Vec<usize>> = HashMap::new();

    for r in 0..height - 1 {
        for c in 0..width - 1 {
            let ul = at(r, c);
            let ur = at(r, c + 1);
            let ll = at(r + 1, c);
            let lr = at(r + 1, c + 1);

            let case = (ul as u8) | ((ur as u8) << 1) | ((ll as u8) << 2) | ((lr as u8) << 3);
            if case == 0 || case == 15 {
                continue;
            }

            let rf = r as f64;
            let cf = c as f64;
            let top = (rf, cf + 0.5);
            let bottom = (rf + 1.0, cf + 0.5);
            let left = (rf + 0.5, cf);
            let right = (rf + 0.5, cf + 1.0);

            // Segment table for the low-orientation convention; saddle
            // cases (6, 9) connect around the low corners.
            let segments: &[(ContourPoint, ContourPoint)] = match case {
                1 => &[(top, left)],
                2 => &[(right, top)],
                3 => &[(right, left)],
                4 => &[(left, bottom)],
                5 => &[(top, bottom)],
                6 => &[(right, top), (left, bottom)],
                7 => &[(right, bottom)],
                8 => &[(bottom, right)],
                9 => &[(top, left), (bottom, right)],
                10 => &[(bottom, top)],
                11 => &[(bottom, left)],
                12 => &[(left, right)],
                13 => &[(top, right)],
                14 => &[(left, top)],
                _ => unreachable!(),
            };

            for &(a, b) in segments {
                by_start.entry(key(a)).or_default().push(starts.len());
                starts.push(a);
                ends.push(b);
            }
        }
    }

    // Chain segments end-to-start into closed loops. Seeding in insertion
    // order keeps contour discovery deterministic.
    let mut used = vec![false; starts.len()];
    let mut contours = Vec::new();

    for seed in 0..starts.len() {
        if used[seed] {
            continue;
        }
        let mut contour = Vec::new();
        let mut current = seed;
        loop {
            used[current] = true;
            contour.push(starts[current]);

            let next = by_start
                .get(&key(ends[current]))
                .and_then(|v| v.iter().copied().find(|&i| !used[i]));
            match next {
                Some(i) => current = i,
                None => {
                    // Back at the seed: on a padded mask every chain is a
                    // closed loop, so this end is the seed's start.
                    contour.push(ends[current]);
                    break;
                }
            }
        }
        contours.push(contour);
    }

    contours
}
