use ndarray::{ArrayView1, ArrayView2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct Split {
    feature: usize,
    threshold: f64,
}

/// CART regression tree grown on squared error.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grows a tree over the rows named by `indices` (duplicates allowed).
    pub fn fit(x: ArrayView2<f64>, y: &[f64], indices: &[usize], params: TreeParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        if indices.is_empty() {
            tree.nodes.push(Node::Leaf(0.0));
            return tree;
        }
        tree.grow(x, y, indices.to_vec(), 0, &params);
        tree
    }

    fn grow(
        &mut self,
        x: ArrayView2<f64>,
        y: &[f64],
        indices: Vec<usize>,
        depth: usize,
        params: &TreeParams,
    ) -> usize {
        let n = indices.len();
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n as f64;
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf(mean));

        let depth_ok = params.max_depth.map_or(true, |max| depth < max);
        let min_leaf = params.min_samples_leaf.max(1);
        if !depth_ok || n < params.min_samples_split.max(2) || n < 2 * min_leaf {
            return id;
        }

        let Some(split) = best_split(x, y, &indices, min_leaf) else {
            return id;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, split.feature]] <= split.threshold);

        let left = self.grow(x, y, left_rows, depth + 1, params);
        let right = self.grow(x, y, right_rows, depth + 1, params);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes[id] {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Best variance-reducing split, or `None` when no split improves on the parent.
fn best_split(x: ArrayView2<f64>, y: &[f64], indices: &[usize], min_leaf: usize) -> Option<Split> {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n as f64;

    let mut best: Option<(f64, Split)> = None;
    let mut order = indices.to_vec();
    for feature in 0..x.ncols() {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let mut left_sum = 0.0;
        for k in 1..n {
            left_sum += y[order[k - 1]];
            if k < min_leaf || n - k < min_leaf {
                continue;
            }
            let lo = x[[order[k - 1], feature]];
            let hi = x[[order[k], feature]];
            if lo >= hi {
                continue;
            }
            let right_sum = total - left_sum;
            // maximizing this is equivalent to minimizing the children's squared error
            let score = left_sum * left_sum / k as f64 + right_sum * right_sum / (n - k) as f64;
            if score <= parent_score + 1e-9 {
                continue;
            }
            if best.as_ref().map_or(true, |(top, _)| score > *top) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some((score, Split { feature, threshold }));
            }
        }
    }
    best.map(|(_, split)| split)
}
