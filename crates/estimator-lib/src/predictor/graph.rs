//! Interpreter for ONNX-ML pipeline graphs
//!
//! Scikit-learn pipelines exported to ONNX mix standard operators with the
//! `ai.onnx.ml` domain (Scaler, OneHotEncoder, TreeEnsembleRegressor), which
//! the tract optimizer does not run. The graph is parsed once into a list of
//! steps in file order and evaluated on tract tensors for every request.

use anyhow::{bail, ensure, Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use tract_onnx::data_resolver::FopenDataResolver;
use tract_onnx::pb::{GraphProto, NodeProto, TensorProto};
use tract_onnx::prelude::*;
use tract_onnx::tensor::load_tensor;

/// Operator domain used by scikit-learn exports
pub const ML_DOMAIN: &str = "ai.onnx.ml";

/// Whether any node of the graph belongs to the ONNX-ML domain
pub fn uses_ml_domain(graph: &GraphProto) -> bool {
    graph.node.iter().any(|node| node.domain == ML_DOMAIN)
}

/// A parsed graph ready for evaluation
#[derive(Debug)]
pub struct MlGraph {
    inputs: Vec<String>,
    outputs: Vec<String>,
    constants: HashMap<String, Tensor>,
    steps: Vec<Step>,
}

#[derive(Debug)]
struct Step {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    op: MlOp,
}

#[derive(Debug)]
enum MlOp {
    Identity,
    Constant(Tensor),
    Cast(DatumType),
    Concat { axis: i64 },
    Reshape,
    Flatten { axis: i64 },
    Scaler { offset: Vec<f32>, scale: Vec<f32> },
    OneHot { categories: Categories, zeros: bool },
    ArrayFeatureExtractor,
    TreeEnsemble(TreeEnsemble),
}

#[derive(Debug)]
enum Categories {
    Strings(Vec<String>),
    Ints(Vec<i64>),
}

impl MlGraph {
    /// Parse a graph, rejecting operators this interpreter cannot run
    pub fn parse(graph: &GraphProto) -> Result<Self> {
        let mut constants = HashMap::new();
        for init in &graph.initializer {
            let tensor = load_tensor(&FopenDataResolver, init, None)
                .with_context(|| format!("Failed to load initializer '{}'", init.name))?;
            constants.insert(init.name.clone(), tensor);
        }

        let inputs: Vec<String> = graph
            .input
            .iter()
            .map(|input| input.name.clone())
            .filter(|name| !constants.contains_key(name))
            .collect();

        let mut known: HashSet<String> = inputs.iter().chain(constants.keys()).cloned().collect();
        let mut steps = Vec::with_capacity(graph.node.len());

        for node in &graph.node {
            for input in node.input.iter().filter(|name| !name.is_empty()) {
                ensure!(
                    known.contains(input),
                    "Node '{}' ({}) reads '{}' before it is produced",
                    node.name,
                    node.op_type,
                    input
                );
            }
            let op = MlOp::parse(node)?;
            known.extend(node.output.iter().cloned());
            steps.push(Step {
                name: node.name.clone(),
                inputs: node.input.clone(),
                outputs: node.output.clone(),
                op,
            });
        }

        let outputs: Vec<String> = graph.output.iter().map(|output| output.name.clone()).collect();
        ensure!(!outputs.is_empty(), "Graph declares no outputs");
        for output in &outputs {
            ensure!(known.contains(output), "Graph output '{}' is never produced", output);
        }

        Ok(Self {
            inputs,
            outputs,
            constants,
            steps,
        })
    }

    /// Names of the graph inputs that must be fed, in declaration order
    pub fn input_names(&self) -> &[String] {
        &self.inputs
    }

    /// Evaluate the graph, returning the declared outputs in order
    pub fn run(&self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        ensure!(
            inputs.len() == self.inputs.len(),
            "Graph expects {} inputs, got {}",
            self.inputs.len(),
            inputs.len()
        );

        let mut values: HashMap<&str, Tensor> =
            self.inputs.iter().map(String::as_str).zip(inputs).collect();

        for step in &self.steps {
            let args = step
                .inputs
                .iter()
                .map(|name| {
                    if name.is_empty() {
                        Ok(None)
                    } else {
                        self.lookup(&values, name).map(Some)
                    }
                })
                .collect::<Result<Vec<Option<&Tensor>>>>()?;

            let results = step
                .op
                .eval(&args)
                .with_context(|| format!("Failed to evaluate node '{}'", step.name))?;

            for (name, tensor) in step.outputs.iter().zip(results) {
                values.insert(name.as_str(), tensor);
            }
        }

        self.outputs
            .iter()
            .map(|name| self.lookup(&values, name).cloned())
            .collect()
    }

    fn lookup<'a>(&'a self, values: &'a HashMap<&str, Tensor>, name: &str) -> Result<&'a Tensor> {
        values
            .get(name)
            .or_else(|| self.constants.get(name))
            .with_context(|| format!("Value '{}' is not available", name))
    }
}

impl MlOp {
    fn parse(node: &NodeProto) -> Result<Self> {
        let op = match (node.domain.as_str(), node.op_type.as_str()) {
            ("" | "ai.onnx", "Identity") => MlOp::Identity,
            ("" | "ai.onnx", "Constant") => {
                let value: &TensorProto = node.get_attr("value")?;
                MlOp::Constant(load_tensor(&FopenDataResolver, value, None)?)
            }
            ("" | "ai.onnx", "Cast") => MlOp::Cast(node.get_attr("to")?),
            ("" | "ai.onnx", "Concat") => MlOp::Concat {
                axis: node.get_attr("axis")?,
            },
            ("" | "ai.onnx", "Reshape") => MlOp::Reshape,
            ("" | "ai.onnx", "Flatten") => MlOp::Flatten {
                axis: node.get_attr_opt("axis")?.unwrap_or(1),
            },
            (ML_DOMAIN, "Scaler") => MlOp::Scaler {
                offset: node.get_attr_opt_slice::<f32>("offset")?.unwrap_or(&[]).to_vec(),
                scale: node.get_attr_opt_slice::<f32>("scale")?.unwrap_or(&[]).to_vec(),
            },
            (ML_DOMAIN, "OneHotEncoder") => {
                let categories = if let Some(strings) = node.get_attr_opt_vec::<String>("cats_strings")? {
                    Categories::Strings(strings)
                } else if let Some(ints) = node.get_attr_opt_slice::<i64>("cats_int64s")? {
                    Categories::Ints(ints.to_vec())
                } else {
                    return node.bail("needs cats_strings or cats_int64s");
                };
                MlOp::OneHot {
                    categories,
                    zeros: node.get_attr_opt::<i64>("zeros")?.unwrap_or(1) != 0,
                }
            }
            (ML_DOMAIN, "ArrayFeatureExtractor") => MlOp::ArrayFeatureExtractor,
            (ML_DOMAIN, "TreeEnsembleRegressor") => MlOp::TreeEnsemble(TreeEnsemble::parse(node)?),
            (domain, op_type) => bail!(
                "Unsupported operator {}{}{} in node '{}'",
                domain,
                if domain.is_empty() { "" } else { "." },
                op_type,
                node.name
            ),
        };
        Ok(op)
    }

    fn eval(&self, args: &[Option<&Tensor>]) -> Result<Vec<Tensor>> {
        let output = match self {
            MlOp::Identity => arg(args, 0)?.clone(),
            MlOp::Constant(tensor) => tensor.clone(),
            MlOp::Cast(dt) => arg(args, 0)?.cast_to_dt(*dt)?.into_owned(),
            MlOp::Concat { axis } => {
                let tensors = args
                    .iter()
                    .copied()
                    .map(|t| t.context("Concat input is missing"))
                    .collect::<Result<Vec<&Tensor>>>()?;
                let first = tensors.first().context("Concat has no inputs")?;
                let axis = normalize_axis(*axis, first.rank())?;
                Tensor::stack_tensors(axis, &tensors)?
            }
            MlOp::Reshape => reshape(arg(args, 0)?, arg(args, 1)?)?,
            MlOp::Flatten { axis } => {
                let input = arg(args, 0)?;
                let axis = if *axis == input.rank() as i64 {
                    input.rank()
                } else {
                    normalize_axis(*axis, input.rank())?
                };
                let outer: usize = input.shape()[..axis].iter().product();
                let inner: usize = input.shape()[axis..].iter().product();
                input.clone().into_shape(&[outer, inner])?
            }
            MlOp::Scaler { offset, scale } => scaler(arg(args, 0)?, offset, scale)?,
            MlOp::OneHot { categories, zeros } => one_hot(arg(args, 0)?, categories, *zeros)?,
            MlOp::ArrayFeatureExtractor => gather_last(arg(args, 0)?, arg(args, 1)?)?,
            MlOp::TreeEnsemble(ensemble) => ensemble.eval(arg(args, 0)?)?,
        };
        Ok(vec![output])
    }
}

fn arg<'a>(args: &[Option<&'a Tensor>], ix: usize) -> Result<&'a Tensor> {
    args.get(ix)
        .copied()
        .flatten()
        .with_context(|| format!("Missing input #{}", ix))
}

fn normalize_axis(axis: i64, rank: usize) -> Result<usize> {
    let resolved = if axis < 0 { axis + rank as i64 } else { axis };
    ensure!(
        (0..rank as i64).contains(&resolved),
        "Axis {} out of range for rank {}",
        axis,
        rank
    );
    Ok(resolved as usize)
}

fn reshape(input: &Tensor, shape: &Tensor) -> Result<Tensor> {
    let shape = shape.cast_to::<i64>()?;
    let requested = shape.as_slice::<i64>()?;

    let mut dims = Vec::with_capacity(requested.len());
    let mut inferred = None;
    for (ix, &dim) in requested.iter().enumerate() {
        match dim {
            0 => dims.push(*input.shape().get(ix).context("Reshape copies a missing dimension")?),
            -1 => {
                ensure!(inferred.is_none(), "Reshape infers more than one dimension");
                inferred = Some(ix);
                dims.push(1);
            }
            d if d > 0 => dims.push(d as usize),
            d => bail!("Invalid reshape dimension {}", d),
        }
    }

    if let Some(ix) = inferred {
        let known: usize = dims.iter().product();
        ensure!(known > 0 && input.len() % known == 0, "Cannot infer reshape dimension");
        dims[ix] = input.len() / known;
    }

    ensure!(
        dims.iter().product::<usize>() == input.len(),
        "Cannot reshape {:?} into {:?}",
        input.shape(),
        dims
    );
    input.clone().into_shape(&dims)
}

fn pick(values: &[f32], ix: usize, default: f32) -> f32 {
    match values.len() {
        0 => default,
        1 => values[0],
        _ => values[ix],
    }
}

fn scaler(input: &Tensor, offset: &[f32], scale: &[f32]) -> Result<Tensor> {
    ensure!(input.rank() >= 1, "Scaler needs at least one axis");
    let mut data = input.cast_to::<f32>()?.into_owned().into_array::<f32>()?;
    let columns = *data.shape().last().unwrap_or(&1);
    for coefs in [offset, scale] {
        ensure!(
            coefs.len() <= 1 || coefs.len() == columns,
            "Scaler has {} coefficients for {} columns",
            coefs.len(),
            columns
        );
    }

    for (ix, value) in data.iter_mut().enumerate() {
        let column = ix % columns;
        *value = (*value - pick(offset, column, 0.0)) * pick(scale, column, 1.0);
    }
    Ok(data.into())
}

fn one_hot(input: &Tensor, categories: &Categories, zeros: bool) -> Result<Tensor> {
    let positions: Vec<Option<usize>> = match categories {
        Categories::Strings(cats) => input
            .as_slice::<String>()?
            .iter()
            .map(|value| cats.iter().position(|cat| cat == value))
            .collect(),
        Categories::Ints(cats) => input
            .cast_to::<i64>()?
            .as_slice::<i64>()?
            .iter()
            .map(|value| cats.iter().position(|cat| cat == value))
            .collect(),
    };
    let width = match categories {
        Categories::Strings(cats) => cats.len(),
        Categories::Ints(cats) => cats.len(),
    };

    let mut data = vec![0f32; positions.len() * width];
    for (row, position) in positions.iter().enumerate() {
        match position {
            Some(col) => data[row * width + col] = 1.0,
            None if zeros => {}
            None => bail!("Unknown category at position {}", row),
        }
    }

    let mut shape = input.shape().to_vec();
    shape.push(width);
    Tensor::from_shape(&shape, &data)
}

fn gather_last(input: &Tensor, indices: &Tensor) -> Result<Tensor> {
    ensure!(input.rank() >= 1, "ArrayFeatureExtractor needs at least one axis");
    let axis = input.rank() - 1;
    let columns = input.shape()[axis];
    let indices = indices.cast_to::<i64>()?;
    let indices = indices
        .as_slice::<i64>()?
        .iter()
        .map(|&ix| {
            ensure!((0..columns as i64).contains(&ix), "Index {} out of range for {} columns", ix, columns);
            Ok(ix as usize)
        })
        .collect::<Result<Vec<usize>>>()?;

    fn select<T: Datum>(input: &Tensor, axis: usize, indices: &[usize]) -> Result<Tensor> {
        let view = input.to_array_view::<T>()?;
        Ok(view.select(tract_ndarray::Axis(axis), indices).into())
    }

    match input.datum_type() {
        DatumType::String => select::<String>(input, axis, &indices),
        DatumType::F32 => select::<f32>(input, axis, &indices),
        DatumType::F64 => select::<f64>(input, axis, &indices),
        DatumType::I64 => select::<i64>(input, axis, &indices),
        dt => bail!("ArrayFeatureExtractor does not handle {:?}", dt),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BranchMode {
    Leq,
    Lt,
    Gte,
    Gt,
    Eq,
    Neq,
}

impl BranchMode {
    fn holds(self, x: f32, threshold: f32) -> bool {
        match self {
            BranchMode::Leq => x <= threshold,
            BranchMode::Lt => x < threshold,
            BranchMode::Gte => x >= threshold,
            BranchMode::Gt => x > threshold,
            BranchMode::Eq => x == threshold,
            BranchMode::Neq => x != threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Aggregate {
    Sum,
    Average,
    Min,
    Max,
}

#[derive(Debug)]
enum TreeNode {
    Branch {
        feature: usize,
        threshold: f32,
        mode: BranchMode,
        on_true: usize,
        on_false: usize,
        missing_true: bool,
    },
    Leaf {
        weights: Vec<(usize, f32)>,
    },
}

/// One decision tree, root first
#[derive(Debug)]
struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    fn leaf(&self, row: &[f32]) -> Result<&[(usize, f32)]> {
        let mut ix = 0;
        for _ in 0..self.nodes.len() {
            match &self.nodes[ix] {
                TreeNode::Leaf { weights } => return Ok(weights.as_slice()),
                TreeNode::Branch {
                    feature,
                    threshold,
                    mode,
                    on_true,
                    on_false,
                    missing_true,
                } => {
                    let x = *row
                        .get(*feature)
                        .with_context(|| format!("Feature {} out of range", feature))?;
                    let go_true = if x.is_nan() { *missing_true } else { mode.holds(x, *threshold) };
                    ix = if go_true { *on_true } else { *on_false };
                }
            }
        }
        bail!("Tree does not reach a leaf")
    }
}

/// Tree ensemble regressor (gradient boosting, random forest)
#[derive(Debug)]
struct TreeEnsemble {
    trees: Vec<Tree>,
    n_targets: usize,
    base_values: Vec<f32>,
    aggregate: Aggregate,
}

fn floats_attr(node: &NodeProto, name: &str) -> Result<Option<Vec<f32>>> {
    if let Some(values) = node.get_attr_opt_slice::<f32>(name)? {
        return Ok(Some(values.to_vec()));
    }
    let tensor_name = format!("{}_as_tensor", name);
    match node.get_attr_opt::<&TensorProto>(&tensor_name)? {
        Some(proto) => {
            let tensor = load_tensor(&FopenDataResolver, proto, None)?;
            let values = tensor.cast_to::<f32>()?.as_slice::<f32>()?.to_vec();
            Ok(Some(values))
        }
        None => Ok(None),
    }
}

impl TreeEnsemble {
    fn parse(node: &NodeProto) -> Result<Self> {
        let tree_ids = node.get_attr_slice::<i64>("nodes_treeids")?;
        let node_ids = node.get_attr_slice::<i64>("nodes_nodeids")?;
        let feature_ids = node.get_attr_slice::<i64>("nodes_featureids")?;
        let thresholds = floats_attr(node, "nodes_values")?.unwrap_or_default();
        let modes = node.get_attr_vec::<&str>("nodes_modes")?;
        let true_ids = node.get_attr_slice::<i64>("nodes_truenodeids")?;
        let false_ids = node.get_attr_slice::<i64>("nodes_falsenodeids")?;
        let missing = node
            .get_attr_opt_slice::<i64>("nodes_missing_value_tracks_true")?
            .unwrap_or(&[]);

        let count = node_ids.len();
        for (name, len) in [
            ("nodes_treeids", tree_ids.len()),
            ("nodes_featureids", feature_ids.len()),
            ("nodes_values", thresholds.len()),
            ("nodes_modes", modes.len()),
            ("nodes_truenodeids", true_ids.len()),
            ("nodes_falsenodeids", false_ids.len()),
        ] {
            node.expect_attr(name, len == count, "one entry per tree node")?;
        }
        node.expect_attr(
            "nodes_missing_value_tracks_true",
            missing.is_empty() || missing.len() == count,
            "one entry per tree node",
        )?;

        let target_trees = node.get_attr_slice::<i64>("target_treeids")?;
        let target_nodes = node.get_attr_slice::<i64>("target_nodeids")?;
        let target_ids = node.get_attr_slice::<i64>("target_ids")?;
        let target_weights = floats_attr(node, "target_weights")?.unwrap_or_default();
        for (name, len) in [
            ("target_nodeids", target_nodes.len()),
            ("target_ids", target_ids.len()),
            ("target_weights", target_weights.len()),
        ] {
            node.expect_attr(name, len == target_trees.len(), "one entry per target")?;
        }

        let n_targets = node.get_attr_opt::<usize>("n_targets")?.unwrap_or(1);
        let base_values = floats_attr(node, "base_values")?.unwrap_or_default();
        node.expect_attr(
            "base_values",
            base_values.is_empty() || base_values.len() == n_targets,
            "one value per target",
        )?;

        let aggregate = match node.get_attr_opt::<&str>("aggregate_function")?.unwrap_or("SUM") {
            "SUM" => Aggregate::Sum,
            "AVERAGE" => Aggregate::Average,
            "MIN" => Aggregate::Min,
            "MAX" => Aggregate::Max,
            other => return node.bail_attr("aggregate_function", &format!("unsupported {}", other)),
        };
        let post_transform = node.get_attr_opt::<&str>("post_transform")?.unwrap_or("NONE");
        node.expect_attr("post_transform", post_transform == "NONE", "NONE for a regressor")?;

        let mut leaf_weights: HashMap<(i64, i64), Vec<(usize, f32)>> = HashMap::new();
        for ix in 0..target_trees.len() {
            let target = usize::try_from(target_ids[ix]).context("Negative target id")?;
            ensure!(target < n_targets, "Target id {} exceeds n_targets {}", target, n_targets);
            leaf_weights
                .entry((target_trees[ix], target_nodes[ix]))
                .or_default()
                .push((target, target_weights[ix]));
        }

        let mut by_tree: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (pos, &tree_id) in tree_ids.iter().enumerate() {
            by_tree.entry(tree_id).or_default().push(pos);
        }

        let mut trees = Vec::with_capacity(by_tree.len());
        for (tree_id, mut positions) in by_tree {
            positions.sort_by_key(|&pos| node_ids[pos]);
            let local: HashMap<i64, usize> = positions
                .iter()
                .enumerate()
                .map(|(ix, &pos)| (node_ids[pos], ix))
                .collect();
            let resolve = |id: i64| {
                local
                    .get(&id)
                    .copied()
                    .with_context(|| format!("Tree {} has no node {}", tree_id, id))
            };

            let mut nodes = Vec::with_capacity(positions.len());
            for &pos in &positions {
                let mode = match modes[pos] {
                    "LEAF" => None,
                    "BRANCH_LEQ" => Some(BranchMode::Leq),
                    "BRANCH_LT" => Some(BranchMode::Lt),
                    "BRANCH_GTE" => Some(BranchMode::Gte),
                    "BRANCH_GT" => Some(BranchMode::Gt),
                    "BRANCH_EQ" => Some(BranchMode::Eq),
                    "BRANCH_NEQ" => Some(BranchMode::Neq),
                    other => return node.bail_attr("nodes_modes", &format!("unsupported {}", other)),
                };
                let tree_node = match mode {
                    None => TreeNode::Leaf {
                        weights: leaf_weights
                            .remove(&(tree_id, node_ids[pos]))
                            .unwrap_or_default(),
                    },
                    Some(mode) => TreeNode::Branch {
                        feature: usize::try_from(feature_ids[pos]).context("Negative feature id")?,
                        threshold: thresholds[pos],
                        mode,
                        on_true: resolve(true_ids[pos])?,
                        on_false: resolve(false_ids[pos])?,
                        missing_true: missing.get(pos).is_some_and(|&m| m != 0),
                    },
                };
                nodes.push(tree_node);
            }
            trees.push(Tree { nodes });
        }

        ensure!(!trees.is_empty(), "Tree ensemble has no trees");
        if let Some((tree, leaf)) = leaf_weights.keys().next() {
            bail!("Target weight refers to tree {} node {}, which is not a leaf", tree, leaf);
        }

        Ok(Self {
            trees,
            n_targets,
            base_values,
            aggregate,
        })
    }

    fn eval(&self, input: &Tensor) -> Result<Tensor> {
        let input = input.cast_to::<f32>()?;
        let (rows, columns) = match input.shape() {
            [columns] => (1, *columns),
            [rows, columns] => (*rows, *columns),
            shape => bail!("Tree ensemble expects a 2D input, got {:?}", shape),
        };
        let data = input.as_slice::<f32>()?;

        let mut output = Vec::with_capacity(rows * self.n_targets);
        for row in 0..rows {
            let features = &data[row * columns..(row + 1) * columns];
            let mut scores: Vec<Option<f64>> = vec![None; self.n_targets];

            for tree in &self.trees {
                for &(target, weight) in tree.leaf(features)? {
                    let weight = weight as f64;
                    let score = &mut scores[target];
                    *score = Some(match (self.aggregate, *score) {
                        (_, None) => weight,
                        (Aggregate::Sum | Aggregate::Average, Some(acc)) => acc + weight,
                        (Aggregate::Min, Some(acc)) => acc.min(weight),
                        (Aggregate::Max, Some(acc)) => acc.max(weight),
                    });
                }
            }

            for (target, score) in scores.into_iter().enumerate() {
                let mut value = score.unwrap_or(0.0);
                if self.aggregate == Aggregate::Average {
                    value /= self.trees.len() as f64;
                }
                value += pick(&self.base_values, target, 0.0) as f64;
                output.push(value as f32);
            }
        }

        Tensor::from_shape(&[rows, self.n_targets], &output)
    }
}
