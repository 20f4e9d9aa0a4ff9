///! Cluster portal file module
///!
///! Text format, one portal per line after the header:
///! `PRT1`, cluster count, portal count, then `{points} {cluster0} {cluster1} (x y z ) ...`.

use std::{fmt::Write as _, io::Write, path::Path};
use itertools::Itertools;
use crate::{
    bsp::Tree,
    contents::Contents,
    error::{PortalFileError, Result},
    math::Vec3d,
    portal::{make_vis_portals, portal_vis_flood},
    session::CompileSession,
    winding::Winding,
    NodeId,
};

/// Portal file magic
pub const PORTAL_FILE_MAGIC: &str = "PRT1";

/// Maximal count of points portal file winding may have
pub const MAX_PORTAL_POINTS: usize = 64;

/// Portal between two clusters
#[derive(Clone, Debug, PartialEq)]
pub struct FilePortal {
    /// Clusters portal separates, the winding faces the first one
    pub clusters: [u32; 2],

    /// Portal polygon
    pub winding: Winding,
}

/// Cluster portal set
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortalFile {
    /// Count of visibility clusters
    pub cluster_count: usize,

    /// Portals
    pub portals: Vec<FilePortal>,
}

/// Assign cluster numbers, everything below a detail separator is a single cluster
fn number_leafs(tree: &mut Tree) -> u32 {
    let mut cluster_count = 0;
    let mut stack = vec![tree.head];

    while let Some(id) = stack.pop() {
        let node = tree.node(id);

        if let Some(split) = node.split.filter(|split| !split.detail_separator) {
            tree.node_mut(id).cluster = None;
            stack.push(split.children[1]);
            stack.push(split.children[0]);
            continue;
        }

        // viewpoint is never inside of a solid
        if node.contents.contains(Contents::SOLID) {
            tree.node_mut(id).cluster = None;
            continue;
        }

        fill_cluster(tree, id, cluster_count);
        cluster_count += 1;
    }

    cluster_count
}

/// Set cluster of the whole subtree, solid leafs excluded
fn fill_cluster(tree: &mut Tree, root: NodeId, cluster: u32) {
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        let node = tree.node_mut(id);

        match node.split {
            Some(split) => {
                node.cluster = Some(cluster);
                stack.extend(split.children);
            }
            None => {
                node.cluster = if node.contents.contains(Contents::SOLID) { None } else { Some(cluster) };
            }
        }
    }
}

/// Cluster nodes of the tree, front ones first
fn cluster_nodes(tree: &Tree) -> Vec<NodeId> {
    let mut nodes = Vec::new();
    let mut stack = vec![tree.head];

    while let Some(id) = stack.pop() {
        match tree.node(id).split.filter(|split| !split.detail_separator) {
            Some(split) => {
                stack.push(split.children[1]);
                stack.push(split.children[0]);
            }
            None => nodes.push(id),
        }
    }

    nodes
}

/// Write coordinate, near-integer values are written as integers
fn write_float(out: &mut String, value: f64) {
    let rounded = (value + 0.5).floor();

    // writing to string never fails
    _ = if (value - rounded).abs() < 0.001 {
        write!(out, "{} ", rounded as i64)
    } else {
        write!(out, "{:.6} ", value)
    };
}

impl PortalFile {
    /// Build portal file of the world tree. Leaf clusters are written into `tree`, its portals are kept.
    pub fn build(session: &CompileSession, tree: &mut Tree) -> Result<Self> {
        log::trace!("--- portal file ---");

        let cluster_count = number_leafs(tree);

        let mut vis_tree = tree.clone();
        make_vis_portals(session, &mut vis_tree)?;

        let mut portals = Vec::new();

        for id in cluster_nodes(&vis_tree) {
            let node = vis_tree.node(id);
            if node.contents.contains(Contents::SOLID) {
                continue;
            }

            for &portal_id in &node.portals {
                let portal = vis_tree.portal(portal_id);

                // written from the front node only
                if portal.nodes[0] != id || !portal_vis_flood(&vis_tree, portal) {
                    continue;
                }

                let [Some(c0), Some(c1)] = portal.nodes.map(|node| vis_tree.node(node).cluster) else {
                    log::warn!("vis portal {} between unnumbered clusters", portal_id.into_index());
                    continue;
                };

                // planes may turn around near axis changeover, vis interprets the winding plane
                let clusters = if (portal.plane.normal ^ portal.winding.plane().normal) < 0.99 {
                    [c1, c0]
                } else {
                    [c0, c1]
                };

                portals.push(FilePortal { clusters, winding: portal.winding.clone() });
            }
        }

        log::info!("{:5} visclusters", cluster_count);
        log::info!("{:5} visportals", portals.len());

        Ok(Self { cluster_count: cluster_count as usize, portals })
    } // build

    /// Convert portal file to text
    pub fn to_text(&self) -> String {
        let mut text = format!("{}\n{}\n{}\n", PORTAL_FILE_MAGIC, self.cluster_count, self.portals.len());

        for portal in &self.portals {
            _ = write!(text, "{} {} {} ", portal.winding.points.len(), portal.clusters[0], portal.clusters[1]);

            for point in &portal.winding.points {
                text.push('(');
                for axis in 0..3 {
                    write_float(&mut text, point[axis]);
                }
                text.push_str(") ");
            }
            text.push('\n');
        }

        text
    }

    /// Write portal file text
    pub fn write(&self, out: &mut impl Write) -> std::io::Result<()> {
        out.write_all(self.to_text().as_bytes())
    }

    /// Write portal file to filesystem
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }

    /// Load portal file from filesystem
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text)?)
    }

    /// Parse portal file text
    pub fn parse(text: &str) -> std::result::Result<Self, PortalFileError> {
        type Tokens<'t, 'l> = &'l [&'t str];

        /// Parse **any** next token
        fn parse_next_token<'t, 'l>(tl: Tokens<'t, 'l>) -> std::result::Result<(&'t str, Tokens<'t, 'l>), PortalFileError> {
            tl.split_first()
                .map(|(token, rest)| (*token, rest))
                .ok_or(PortalFileError::NextTokenExpected)
        }

        fn parse_literal<'t, 'l>(tl: Tokens<'t, 'l>, literal: &'static str) -> std::result::Result<Tokens<'t, 'l>, PortalFileError> {
            let (token, tl) = parse_next_token(tl)?;

            if token == literal {
                Ok(tl)
            } else {
                Err(PortalFileError::UnexpectedToken { actual: token.to_string(), expected: literal })
            }
        }

        fn parse_integer<'t, 'l>(tl: Tokens<'t, 'l>) -> std::result::Result<(i64, Tokens<'t, 'l>), PortalFileError> {
            let (token, tl) = parse_next_token(tl)?;
            let value = token.parse::<i64>().map_err(|_| PortalFileError::BadNumber { token: token.to_string() })?;

            Ok((value, tl))
        }

        fn parse_float<'t, 'l>(tl: Tokens<'t, 'l>) -> std::result::Result<(f64, Tokens<'t, 'l>), PortalFileError> {
            let (token, tl) = parse_next_token(tl)?;
            let value = token.parse::<f64>().map_err(|_| PortalFileError::BadNumber { token: token.to_string() })?;

            Ok((value, tl))
        }

        fn parse_point<'t, 'l>(tl: Tokens<'t, 'l>) -> std::result::Result<(Vec3d, Tokens<'t, 'l>), PortalFileError> {
            let tl = parse_literal(tl, "(")?;
            let (x, tl) = parse_float(tl)?;
            let (y, tl) = parse_float(tl)?;
            let (z, tl) = parse_float(tl)?;
            let tl = parse_literal(tl, ")")?;

            Ok((Vec3d::new(x, y, z), tl))
        }

        // parentheses are separate tokens even if written together with numbers
        let tokens = text
            .split_whitespace()
            .flat_map(|word| word.split_inclusive(['(', ')']))
            .flat_map(|part| match part.strip_suffix(['(', ')']) {
                Some(rest) if !rest.is_empty() => vec![rest, &part[rest.len()..]],
                _ => vec![part],
            })
            .collect_vec();

        let (magic, tl) = parse_next_token(&tokens)?;
        if magic != PORTAL_FILE_MAGIC {
            return Err(PortalFileError::BadMagic(magic.to_string()));
        }

        let (cluster_count, tl) = parse_integer(tl)?;
        let (portal_count, mut tl) = parse_integer(tl)?;

        let cluster_count = usize::try_from(cluster_count)
            .map_err(|_| PortalFileError::BadNumber { token: cluster_count.to_string() })?;
        let portal_count = usize::try_from(portal_count)
            .map_err(|_| PortalFileError::BadNumber { token: portal_count.to_string() })?;

        let mut portals = Vec::with_capacity(portal_count);

        for portal in 0..portal_count {
            let point_count;
            let mut clusters = [0u32; 2];

            (point_count, tl) = parse_integer(tl)?;
            if point_count < 3 || point_count > MAX_PORTAL_POINTS as i64 {
                return Err(PortalFileError::BadPointCount { portal, count: point_count });
            }

            for cluster in &mut clusters {
                let value;
                (value, tl) = parse_integer(tl)?;

                if value < 0 || value >= cluster_count as i64 {
                    return Err(PortalFileError::BadCluster { portal, cluster: value, cluster_count });
                }
                *cluster = value as u32;
            }

            let mut points = Vec::with_capacity(point_count as usize);
            for _ in 0..point_count {
                let point;
                (point, tl) = parse_point(tl)?;
                points.push(point);
            }

            portals.push(FilePortal { clusters, winding: Winding::new(points) });
        }

        Ok(Self { cluster_count, portals })
    } // parse
}


// prtfile.rs
