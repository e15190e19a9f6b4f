//! Boosted Haar cascade in OpenCV's `opencv-cascade-classifier` XML layout.

use std::path::Path;

use roxmltree::{Document, Node};

use crate::detection::domain::detector_error::ConfigurationError;

use super::integral_image::IntegralImage;

#[derive(Clone, Copy, Debug, PartialEq)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

impl HaarFeature {
    fn value(&self, ii: &IntegralImage, x: u32, y: u32) -> f64 {
        self.rects
            .iter()
            .map(|r| r.weight * ii.rect_sum(x + r.x, y + r.y, r.width, r.height))
            .sum()
    }
}

/// Split node: children `<= 0` are leaves (`leaf_values[-child]`),
/// positive children index further nodes of the same tree.
#[derive(Clone, Copy, Debug, PartialEq)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Clone, Debug, PartialEq)]
struct WeakTree {
    nodes: Vec<TreeNode>,
    leaf_values: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
struct Stage {
    threshold: f64,
    trees: Vec<WeakTree>,
}

/// A trained cascade: a window size, stages of boosted trees, and the
/// feature table they reference.
#[derive(Clone, Debug, PartialEq)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let xml = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::model_load(path, e))?;
        let cascade = Self::parse(&xml).map_err(|e| ConfigurationError::model_load(path, e))?;
        log::info!(
            "Loaded cascade {} ({}x{} window, {} stages, {} features)",
            path.display(),
            cascade.window_width,
            cascade.window_height,
            cascade.stages.len(),
            cascade.features.len()
        );
        Ok(cascade)
    }

    pub fn parse(xml: &str) -> Result<Self, String> {
        let doc = Document::parse(xml).map_err(|e| format!("malformed XML: {e}"))?;
        let root = doc.root_element();

        let cascade = root
            .children()
            .find(|n| n.is_element())
            .ok_or("empty cascade document")?;
        if cascade.attribute("type_id") == Some("opencv-haar-classifier") {
            return Err("legacy opencv-haar-classifier layout is not supported".into());
        }
        if cascade.tag_name().name() != "cascade" {
            return Err(format!(
                "expected <cascade>, found <{}>",
                cascade.tag_name().name()
            ));
        }

        let stage_type = text(child(cascade, "stageType")?);
        if stage_type.trim() != "BOOST" {
            return Err(format!("unsupported stage type {}", stage_type.trim()));
        }
        let feature_type = text(child(cascade, "featureType")?);
        if feature_type.trim() != "HAAR" {
            return Err(format!("unsupported feature type {}", feature_type.trim()));
        }

        let window_width: u32 = parse_one(child(cascade, "width")?)?;
        let window_height: u32 = parse_one(child(cascade, "height")?)?;
        if window_width < 3 || window_height < 3 {
            return Err(format!("window {window_width}x{window_height} is too small"));
        }

        let features = items(child(cascade, "features")?)
            .map(|f| parse_feature(f, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = items(child(cascade, "stages")?)
            .map(|s| parse_stage(s, features.len()))
            .collect::<Result<Vec<_>, _>>()?;
        if stages.is_empty() {
            return Err("cascade has no stages".into());
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    /// Runs every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// Feature responses are divided by the window's standard deviation
    /// (measured on the window shrunk by one pixel on each side).
    pub fn accepts(&self, ii: &IntegralImage, x: u32, y: u32) -> bool {
        let (nw, nh) = (self.window_width - 2, self.window_height - 2);
        let area = (nw * nh) as f64;
        let sum = ii.rect_sum(x + 1, y + 1, nw, nh);
        let sq_sum = ii.rect_sq_sum(x + 1, y + 1, nw, nh);
        let variance = area * sq_sum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        self.stages.iter().all(|stage| {
            let total: f64 = stage
                .trees
                .iter()
                .map(|tree| self.evaluate_tree(tree, ii, x, y, norm))
                .sum();
            total >= stage.threshold
        })
    }

    fn evaluate_tree(
        &self,
        tree: &WeakTree,
        ii: &IntegralImage,
        x: u32,
        y: u32,
        norm: f64,
    ) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &tree.nodes[idx];
            let value = self.features[node.feature].value(ii, x, y);
            let next = if value < node.threshold * norm {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return tree.leaf_values[(-next) as usize];
            }
            idx = next as usize;
        }
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, String> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| format!("missing <{name}> in <{}>", node.tag_name().name()))
}

/// `<_>` list entries of a container element.
fn items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.has_tag_name("_"))
}

fn text(node: Node) -> String {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_numbers(node: Node) -> Result<Vec<f64>, String> {
    text(node)
        .split_whitespace()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| format!("bad number {t:?} in <{}>", node.tag_name().name()))
        })
        .collect()
}

fn parse_one<T: std::str::FromStr>(node: Node) -> Result<T, String> {
    let raw = text(node);
    raw.trim()
        .parse()
        .map_err(|_| format!("bad value {:?} in <{}>", raw.trim(), node.tag_name().name()))
}

fn parse_feature(node: Node, window_width: u32, window_height: u32) -> Result<HaarFeature, String> {
    if let Some(tilted) = node.children().find(|n| n.has_tag_name("tilted")) {
        if text(tilted).trim() != "0" {
            return Err("tilted Haar features are not supported".into());
        }
    }

    let rects = items(child(node, "rects")?)
        .map(|r| {
            let v = parse_numbers(r)?;
            let &[x, y, w, h, weight] = v.as_slice() else {
                return Err(format!("feature rect needs 5 values, got {}", v.len()));
            };
            if x < 0.0 || y < 0.0 || w < 0.0 || h < 0.0 {
                return Err("feature rect has negative geometry".to_string());
            }
            let rect = WeightedRect {
                x: x as u32,
                y: y as u32,
                width: w as u32,
                height: h as u32,
                weight,
            };
            if rect.x + rect.width > window_width || rect.y + rect.height > window_height {
                return Err("feature rect exceeds the detection window".to_string());
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() {
        return Err("feature without rects".into());
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(node: Node, n_features: usize) -> Result<Stage, String> {
    let threshold: f64 = parse_one(child(node, "stageThreshold")?)?;
    let trees = items(child(node, "weakClassifiers")?)
        .map(|t| parse_tree(t, n_features))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage { threshold, trees })
}

fn parse_tree(node: Node, n_features: usize) -> Result<WeakTree, String> {
    let raw_nodes = parse_numbers(child(node, "internalNodes")?)?;
    let leaf_values = parse_numbers(child(node, "leafValues")?)?;

    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(format!(
            "internalNodes must hold groups of 4 values, got {}",
            raw_nodes.len()
        ));
    }

    let n_nodes = raw_nodes.len() / 4;
    let mut nodes = Vec::with_capacity(n_nodes);
    for (i, chunk) in raw_nodes.chunks_exact(4).enumerate() {
        let node = TreeNode {
            left: chunk[0] as i32,
            right: chunk[1] as i32,
            feature: chunk[2] as usize,
            threshold: chunk[3],
        };
        if chunk[2] < 0.0 || node.feature >= n_features {
            return Err(format!("tree references unknown feature {}", chunk[2]));
        }
        for c in [node.left, node.right] {
            let valid = if c <= 0 {
                ((-c) as usize) < leaf_values.len()
            } else {
                (c as usize) > i && (c as usize) < n_nodes
            };
            if !valid {
                return Err(format!("tree node {i} has invalid child {c}"));
            }
        }
        nodes.push(node);
    }

    Ok(WeakTree { nodes, leaf_values })
}
