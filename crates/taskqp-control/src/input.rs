//! Named groups of observable symbols.
//!
//! An input owns one symbol per component, named
//! `prefix__component__suffix`. Empty parts are left out together with
//! their separator. Updates are plain `symbol name -> value` maps that a
//! controller merges into its observables.

use std::collections::{BTreeSet, HashMap};

use nalgebra::Isometry3;
use taskqp_core::BuildError;
use taskqp_expr::{Expr, ExprMatrix, Frame, Symbol, point3, rotation_from_quaternion};

/// Separator between prefix, component and suffix.
pub const SEPARATOR: &str = "__";

/// Fully-qualified symbol name of an input component.
pub fn qualified_name(prefix: &str, name: &str, suffix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + name.len() + suffix.len() + 2 * SEPARATOR.len());
    if !prefix.is_empty() {
        out.push_str(prefix);
        out.push_str(SEPARATOR);
    }
    out.push_str(name);
    if !suffix.is_empty() {
        out.push_str(SEPARATOR);
        out.push_str(suffix);
    }
    out
}

// ---------------------------------------------------------------------------
// InputArray
// ---------------------------------------------------------------------------

/// An ordered group of component symbols sharing a prefix and suffix.
#[derive(Debug, Clone)]
pub struct InputArray {
    components: Vec<(String, Symbol)>,
}

impl InputArray {
    pub fn new<I, S>(names: I, prefix: &str, suffix: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut components: Vec<(String, Symbol)> = Vec::new();
        for name in names {
            let name = name.as_ref();
            if components.iter().all(|(n, _)| n != name) {
                let symbol = Symbol::new(qualified_name(prefix, name, suffix));
                components.push((name.to_owned(), symbol));
            }
        }
        Self { components }
    }

    /// Symbol of a component.
    pub fn symbol(&self, component: &str) -> Option<&Symbol> {
        self.components
            .iter()
            .find(|(n, _)| n == component)
            .map(|(_, s)| s)
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|(n, _)| n.as_str())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.components.iter().map(|(_, s)| s)
    }

    /// Component symbols as a column, in component order.
    pub fn expression(&self) -> ExprMatrix {
        ExprMatrix::column(self.symbols().map(Expr::from).collect())
    }

    /// Map component values to symbol names.
    ///
    /// Components this input does not own are dropped; components not given
    /// are left out of the result.
    pub fn update_request(&self, values: &[(&str, f64)]) -> HashMap<String, f64> {
        values
            .iter()
            .filter_map(|(component, value)| {
                self.symbol(component)
                    .map(|s| (s.name().to_owned(), *value))
            })
            .collect()
    }

    fn component_expr(&self, component: &str) -> Expr {
        self.symbol(component).map_or_else(Expr::zero, Expr::from)
    }
}

/// Access to the symbol group behind a typed input.
pub trait ObservableInput {
    fn array(&self) -> &InputArray;

    fn symbols(&self) -> Vec<&Symbol> {
        self.array().symbols().collect()
    }

    /// See [`InputArray::update_request`].
    fn update_request(&self, values: &[(&str, f64)]) -> HashMap<String, f64> {
        self.array().update_request(values)
    }
}

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// Value of a [`ScalarInput`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarUpdate {
    pub v: f64,
}

/// A single named value, component `v`.
#[derive(Debug, Clone)]
pub struct ScalarInput(InputArray);

impl ScalarInput {
    pub fn new(prefix: &str, suffix: &str) -> Self {
        Self(InputArray::new(["v"], prefix, suffix))
    }

    pub fn expression(&self) -> Expr {
        self.0.component_expr("v")
    }

    /// Fully-qualified name of the value symbol.
    pub fn symbol_name(&self) -> &str {
        self.0.symbol("v").map_or("", Symbol::name)
    }

    pub fn update(&self, update: ScalarUpdate) -> HashMap<String, f64> {
        self.0.update_request(&[("v", update.v)])
    }
}

impl ObservableInput for ScalarInput {
    fn array(&self) -> &InputArray {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Point3
// ---------------------------------------------------------------------------

/// Value of a [`Point3Input`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3Update {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A 3D point, components `x`, `y`, `z`.
#[derive(Debug, Clone)]
pub struct Point3Input(InputArray);

impl Point3Input {
    pub fn new(prefix: &str, suffix: &str) -> Self {
        Self(InputArray::new(["x", "y", "z"], prefix, suffix))
    }

    /// 3×1 point expression.
    pub fn expression(&self) -> ExprMatrix {
        point3(
            self.0.component_expr("x"),
            self.0.component_expr("y"),
            self.0.component_expr("z"),
        )
    }

    pub fn update(&self, update: Point3Update) -> HashMap<String, f64> {
        self.0
            .update_request(&[("x", update.x), ("y", update.y), ("z", update.z)])
    }
}

impl ObservableInput for Point3Input {
    fn array(&self) -> &InputArray {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Value of a [`FrameInput`]: unit quaternion `(qx, qy, qz, qw)` and position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUpdate {
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub qw: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl FrameUpdate {
    pub fn from_isometry(pose: &Isometry3<f64>) -> Self {
        let q = pose.rotation.quaternion();
        let t = pose.translation.vector;
        Self {
            qx: q.i,
            qy: q.j,
            qz: q.k,
            qw: q.w,
            x: t.x,
            y: t.y,
            z: t.z,
        }
    }
}

/// A rigid pose, components `qx`, `qy`, `qz`, `qw`, `x`, `y`, `z`.
#[derive(Debug, Clone)]
pub struct FrameInput(InputArray);

impl FrameInput {
    pub const COMPONENTS: [&'static str; 7] = ["qx", "qy", "qz", "qw", "x", "y", "z"];

    pub fn new(prefix: &str, suffix: &str) -> Self {
        Self(InputArray::new(Self::COMPONENTS, prefix, suffix))
    }

    /// 3×1 position expression.
    pub fn position(&self) -> ExprMatrix {
        point3(
            self.0.component_expr("x"),
            self.0.component_expr("y"),
            self.0.component_expr("z"),
        )
    }

    /// 3×3 rotation expression from the quaternion components.
    pub fn rotation(&self) -> ExprMatrix {
        rotation_from_quaternion(
            &self.0.component_expr("qx"),
            &self.0.component_expr("qy"),
            &self.0.component_expr("qz"),
            &self.0.component_expr("qw"),
        )
    }

    pub fn frame(&self) -> Frame {
        Frame::from_parts(&self.rotation(), &self.position())
    }

    pub fn update(&self, update: FrameUpdate) -> HashMap<String, f64> {
        self.0.update_request(&[
            ("qx", update.qx),
            ("qy", update.qy),
            ("qz", update.qz),
            ("qw", update.qw),
            ("x", update.x),
            ("y", update.y),
            ("z", update.z),
        ])
    }

    /// Pose stored under this input's symbols in `values`, if complete.
    pub fn read(&self, values: &HashMap<String, f64>) -> Option<Isometry3<f64>> {
        let get = |c: &str| self.0.symbol(c).and_then(|s| values.get(s.name()).copied());
        let rotation = nalgebra::UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
            get("qw")?,
            get("qx")?,
            get("qy")?,
            get("qz")?,
        ));
        let translation = nalgebra::Translation3::new(get("x")?, get("y")?, get("z")?);
        Some(Isometry3::from_parts(translation, rotation))
    }
}

impl ObservableInput for FrameInput {
    fn array(&self) -> &InputArray {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// InputRegistry
// ---------------------------------------------------------------------------

/// Every symbol name claimed by the inputs of one controller.
#[derive(Debug, Clone, Default)]
pub struct InputRegistry {
    names: BTreeSet<String>,
}

impl InputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim all symbols of `input`. Nothing is claimed if any name is taken.
    pub fn register(&mut self, input: &impl ObservableInput) -> Result<(), BuildError> {
        let names: Vec<&str> = input.array().symbols().map(Symbol::name).collect();
        if let Some(taken) = names.iter().find(|n| self.names.contains(**n)) {
            return Err(BuildError::DuplicateSymbol((*taken).to_owned()));
        }
        self.names.extend(names.into_iter().map(str::to_owned));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Claimed names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    #[test]
    fn qualified_names() {
        assert_eq!(qualified_name("eef", "x", "goal"), "eef__x__goal");
        assert_eq!(qualified_name("", "x", "goal"), "x__goal");
        assert_eq!(qualified_name("eef", "x", ""), "eef__x");
        assert_eq!(qualified_name("", "x", ""), "x");
    }

    #[test]
    fn scalar_input_names() {
        let w = ScalarInput::new("gripper", "sc_w");
        assert_eq!(w.symbol_name(), "gripper__v__sc_w");
        assert_eq!(
            w.expression().as_symbol().map(Symbol::name),
            Some("gripper__v__sc_w")
        );
        let update = w.update(ScalarUpdate { v: 2.5 });
        assert_eq!(update.len(), 1);
        assert_relative_eq!(update["gripper__v__sc_w"], 2.5);
    }

    #[test]
    fn point_update_ignores_unknown_components() {
        let p = Point3Input::new("tool", "goal");
        let update = p.update_request(&[("x", 1.0), ("y", 2.0), ("z", 3.0), ("w", 9.0)]);
        assert_eq!(update.len(), 3);
        assert_relative_eq!(update["tool__x__goal"], 1.0);
        assert_relative_eq!(update["tool__y__goal"], 2.0);
        assert_relative_eq!(update["tool__z__goal"], 3.0);
        assert!(!update.values().any(|v| (*v - 9.0).abs() < f64::EPSILON));
    }

    #[test]
    fn partial_update_leaves_components_out() {
        let p = Point3Input::new("tool", "goal");
        let update = p.update_request(&[("y", 2.0)]);
        assert_eq!(update.len(), 1);
        assert!(update.contains_key("tool__y__goal"));
    }

    #[test]
    fn point_expression_evaluates_to_update() {
        let p = Point3Input::new("tool", "goal");
        let values = p.update(Point3Update {
            x: 0.1,
            y: -0.2,
            z: 0.3,
        });
        let m = p.expression().eval(&values).unwrap();
        assert_eq!(m.shape(), (3, 1));
        assert_relative_eq!(m[(0, 0)], 0.1);
        assert_relative_eq!(m[(1, 0)], -0.2);
        assert_relative_eq!(m[(2, 0)], 0.3);
    }

    #[test]
    fn frame_roundtrips_through_symbols() {
        let f = FrameInput::new("tool", "goal");
        let pose = Isometry3::from_parts(
            Translation3::new(0.4, -0.1, 0.9),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.7),
        );
        let values = f.update(FrameUpdate::from_isometry(&pose));
        assert_eq!(values.len(), 7);

        let evaluated = f.frame().eval(&values).unwrap();
        assert_relative_eq!(evaluated, pose.to_homogeneous(), epsilon = 1e-12);

        let read = f.read(&values).unwrap();
        assert_relative_eq!(read.to_homogeneous(), pose.to_homogeneous(), epsilon = 1e-12);
    }

    #[test]
    fn frame_read_requires_every_component() {
        let f = FrameInput::new("tool", "goal");
        let values = f.update_request(&[("x", 1.0), ("y", 2.0)]);
        assert!(f.read(&values).is_none());
    }

    #[test]
    fn identity_frame_is_exact() {
        let f = FrameInput::new("tool", "goal");
        let values = f.update(FrameUpdate::from_isometry(&Isometry3::identity()));
        let m = f.rotation().eval(&values).unwrap();
        assert_eq!(m, nalgebra::DMatrix::identity(3, 3));
    }

    #[test]
    fn registry_detects_duplicates() {
        let mut registry = InputRegistry::new();
        registry.register(&FrameInput::new("tool", "goal")).unwrap();
        registry.register(&ScalarInput::new("tool", "sc_w")).unwrap();
        assert_eq!(registry.len(), 8);

        let err = registry
            .register(&Point3Input::new("tool", "goal"))
            .unwrap_err();
        assert_eq!(err, BuildError::DuplicateSymbol("tool__x__goal".into()));
        // Nothing from the rejected input was claimed.
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn duplicate_component_names_collapse() {
        let array = InputArray::new(["a", "b", "a"], "p", "");
        let names: Vec<&str> = array.component_names().collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
