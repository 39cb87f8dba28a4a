//! Feature recorders and their category scopes
//!
//! A [`FeatureRecorder`] collects the trace records made while one test
//! file runs. Traces are made through a [`Scope`]: the feature itself, or a
//! category within it. Scopes form a chain through their parents, and a
//! trace-to-requirement matcher installed on a scope applies to every scope
//! below it until one installs its own.

use crate::context::TestContext;
use covtrace_core::identity::validate_path;
use covtrace_core::structure::{Branch, clone_structure, get_branch, leaf_paths};
use covtrace_core::{
    FeatureRecording, RawRecord, RequirementRef, ResolveError, Structure, normalize_keys,
    normalize_name,
};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

/// What a trace-to-requirement matcher gets to look at.
pub struct MatchParams<'a> {
    /// The traced name; for a traced path, its last segment.
    pub name: &'a str,
    /// The traced path; a single segment for a traced name.
    pub path: &'a [String],
    /// The part of the structure the trace was made in.
    pub branch: Option<Branch<'a>>,
    /// The whole declared structure of the feature.
    pub structure: &'a Structure,
    pub category_path: &'a [String],
}

/// Maps a traced name or path to the absolute path of a requirement.
/// Returning `None` or an empty path fails the trace.
pub type TraceMatcher = Rc<dyn Fn(&MatchParams<'_>) -> Option<Vec<String>>>;

/// What a trace call names.
#[derive(Clone)]
pub enum TraceTarget {
    Name(String),
    Path(Vec<String>),
    /// A one-off matcher, used instead of any installed one.
    Matcher(TraceMatcher),
}

impl TraceTarget {
    pub fn matcher(
        matcher: impl Fn(&MatchParams<'_>) -> Option<Vec<String>> + 'static,
    ) -> Self {
        TraceTarget::Matcher(Rc::new(matcher))
    }
}

impl fmt::Debug for TraceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceTarget::Name(name) => f.debug_tuple("Name").field(name).finish(),
            TraceTarget::Path(path) => f.debug_tuple("Path").field(path).finish(),
            TraceTarget::Matcher(_) => f.write_str("Matcher(..)"),
        }
    }
}

impl fmt::Display for TraceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceTarget::Name(name) => f.write_str(name),
            TraceTarget::Path(path) => f.write_str(&path.join(" / ")),
            TraceTarget::Matcher(_) => f.write_str("<matcher>"),
        }
    }
}

impl From<&str> for TraceTarget {
    fn from(name: &str) -> Self {
        TraceTarget::Name(name.to_string())
    }
}

impl From<String> for TraceTarget {
    fn from(name: String) -> Self {
        TraceTarget::Name(name)
    }
}

impl From<Vec<String>> for TraceTarget {
    fn from(path: Vec<String>) -> Self {
        TraceTarget::Path(path)
    }
}

impl From<&[&str]> for TraceTarget {
    fn from(path: &[&str]) -> Self {
        TraceTarget::Path(path.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for TraceTarget {
    fn from(path: [&str; N]) -> Self {
        TraceTarget::Path(path.iter().map(|s| s.to_string()).collect())
    }
}

/// A trace call that must fail the test making it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("could not resolve `{reference}` to a requirement")]
    Unresolved { reference: String },
    #[error("`{}` is a category and cannot be traced as a requirement", .path.join(" / "))]
    CategoryTraced { path: Vec<String> },
}

#[derive(Debug, Default)]
struct FeatureState {
    structure: RefCell<Structure>,
    records: RefCell<Vec<RawRecord>>,
}

/// Records which requirements of one feature the tests of a file exercise.
#[derive(Debug)]
pub struct FeatureRecorder {
    title: String,
    group: String,
    description: String,
    headers: Vec<String>,
    state: Rc<FeatureState>,
    root: Scope,
}

impl FeatureRecorder {
    pub fn new(title: impl Into<String>) -> Self {
        let state = Rc::new(FeatureState::default());
        let root = Scope::root(state.clone());
        Self {
            title: title.into(),
            group: String::new(),
            description: String::new(),
            headers: Vec::new(),
            state,
            root,
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The requirements this feature declares.
    pub fn structure(self, structure: Structure) -> Self {
        *self.state.structure.borrow_mut() = normalize_keys(structure);
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The feature-level scope.
    pub fn scope(&self) -> Scope {
        self.root.clone()
    }

    pub fn category<S: AsRef<str>>(&self, path: &[S]) -> Scope {
        self.root.category(path)
    }

    pub fn trace(
        &self,
        target: impl Into<TraceTarget>,
        ctx: &TestContext,
    ) -> Result<(), TraceError> {
        self.root.trace(target, ctx)
    }

    pub fn requirement(&self, target: impl Into<TraceTarget>) -> RequirementHook {
        self.root.requirement(target)
    }

    pub fn set_trace_to_requirement_matcher(&self, matcher: Option<TraceMatcher>) {
        self.root.set_trace_to_requirement_matcher(matcher)
    }

    /// Every trace recorded so far, in call order.
    pub fn records(&self) -> Vec<RawRecord> {
        self.state.records.borrow().clone()
    }

    /// This feature in the on-disk format.
    pub fn to_recording(&self) -> FeatureRecording {
        FeatureRecording {
            title: self.title.clone(),
            group: self.group.clone(),
            description: self.description.clone(),
            structure: clone_structure(&self.state.structure.borrow()),
            headers: self.headers.clone(),
            records: self.records(),
        }
    }
}

/// The feature, or a category inside it, as seen by trace calls.
///
/// Cloning a scope is cheap and yields the same scope: a matcher installed
/// through one clone is seen by all of them.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    feature: Rc<FeatureState>,
    parent: Option<Scope>,
    category_path: Vec<String>,
    matcher: RefCell<Option<TraceMatcher>>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("category_path", &self.inner.category_path)
            .field("has_matcher", &self.inner.matcher.borrow().is_some())
            .finish()
    }
}

enum Resolved {
    /// Produced by a matcher: a path from the feature root.
    Absolute(Vec<String>),
    /// Taken as given, relative to the scope's category.
    Relative(RequirementRef),
}

impl Scope {
    fn root(feature: Rc<FeatureState>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                feature,
                parent: None,
                category_path: Vec::new(),
                matcher: RefCell::new(None),
            }),
        }
    }

    /// A scope for the category at `path`, relative to this one. It inherits
    /// this scope's matcher.
    pub fn category<S: AsRef<str>>(&self, path: &[S]) -> Scope {
        let mut category_path = self.inner.category_path.clone();
        category_path.extend(path.iter().map(|s| normalize_name(s.as_ref())));
        Scope {
            inner: Rc::new(ScopeInner {
                feature: self.inner.feature.clone(),
                parent: Some(self.clone()),
                category_path,
                matcher: RefCell::new(None),
            }),
        }
    }

    /// Path of this scope's category from the feature root.
    pub fn category_path(&self) -> &[String] {
        &self.inner.category_path
    }

    /// Install a matcher for this scope and the scopes below it. `None`
    /// removes this scope's own matcher; a parent's matcher applies again.
    pub fn set_trace_to_requirement_matcher(&self, matcher: Option<TraceMatcher>) {
        *self.inner.matcher.borrow_mut() = matcher;
    }

    /// The nearest installed matcher, looking up through the parents.
    pub fn matcher(&self) -> Option<TraceMatcher> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(matcher) = current.inner.matcher.borrow().as_ref() {
                return Some(matcher.clone());
            }
            scope = current.inner.parent.as_ref();
        }
        None
    }

    /// Record that the test `ctx` exercises `target`.
    pub fn trace(&self, target: impl Into<TraceTarget>, ctx: &TestContext) -> Result<(), TraceError> {
        self.record(&target.into(), ctx)
    }

    /// Wrap test declarations so that running them traces `target`.
    pub fn requirement(&self, target: impl Into<TraceTarget>) -> RequirementHook {
        RequirementHook {
            scope: self.clone(),
            target: target.into(),
        }
    }

    fn record(&self, target: &TraceTarget, ctx: &TestContext) -> Result<(), TraceError> {
        let category = self.category_path();
        let (requirement, record_category) = {
            let structure = self.inner.feature.structure.borrow();
            let resolved = self.resolve(target, &structure)?;

            let absolute = match &resolved {
                Resolved::Absolute(path) => path.clone(),
                Resolved::Relative(RequirementRef::Name(name)) => {
                    find_leaf(&structure, category, name).unwrap_or_else(|| {
                        let mut path = category.to_vec();
                        path.push(normalize_name(name));
                        path
                    })
                }
                Resolved::Relative(RequirementRef::Path(path)) => {
                    [category, path.as_slice()].concat()
                }
            };
            validate_path(&structure, &absolute).map_err(|err| match err {
                ResolveError::CategoryAsRequirement { path } => TraceError::CategoryTraced { path },
                ResolveError::EmptyPath | ResolveError::RequirementAsCategory { .. } => {
                    TraceError::Unresolved {
                        reference: target.to_string(),
                    }
                }
            })?;

            match resolved {
                Resolved::Absolute(path) => (RequirementRef::Path(path), None),
                Resolved::Relative(reference) => {
                    (reference, (!category.is_empty()).then(|| category.to_vec()))
                }
            }
        };

        debug!(requirement = %requirement, test = %ctx.title_path.join(" / "), "trace");
        self.inner.feature.records.borrow_mut().push(RawRecord {
            requirement,
            category: record_category,
            title: ctx.title().to_string(),
            file_path: ctx.file_path.clone(),
            title_path: ctx.title_path.clone(),
        });
        Ok(())
    }

    fn resolve(&self, target: &TraceTarget, structure: &Structure) -> Result<Resolved, TraceError> {
        let (matcher, name, path) = match (target, self.matcher()) {
            (TraceTarget::Matcher(matcher), _) => (matcher.clone(), String::new(), Vec::new()),
            (TraceTarget::Name(name), Some(matcher)) => (matcher, name.clone(), vec![name.clone()]),
            (TraceTarget::Path(path), Some(matcher)) => (
                matcher,
                path.last().cloned().unwrap_or_default(),
                path.clone(),
            ),
            (TraceTarget::Name(name), None) => {
                return Ok(Resolved::Relative(RequirementRef::Name(name.clone())));
            }
            (TraceTarget::Path(path), None) => {
                return Ok(Resolved::Relative(RequirementRef::Path(path.clone())));
            }
        };

        let category = self.category_path();
        let params = MatchParams {
            name: &name,
            path: &path,
            branch: get_branch(structure, category),
            structure,
            category_path: category,
        };
        match matcher(&params) {
            Some(resolved) if !resolved.is_empty() => Ok(Resolved::Absolute(resolved)),
            _ => Err(TraceError::Unresolved {
                reference: target.to_string(),
            }),
        }
    }
}

/// First leaf named `name` inside the category at `category`, as a path from
/// the root.
fn find_leaf(structure: &Structure, category: &[String], name: &str) -> Option<Vec<String>> {
    let name = normalize_name(name);
    let Some(Branch::Category(subtree)) = get_branch(structure, category) else {
        return None;
    };
    leaf_paths(subtree)
        .into_iter()
        .find(|path| path.last().is_some_and(|last| *last == name))
        .map(|path| [category, path.as_slice()].concat())
}

/// Test declarations that trace a requirement when, and only when, they run.
#[derive(Debug, Clone)]
pub struct RequirementHook {
    scope: Scope,
    target: TraceTarget,
}

impl RequirementHook {
    /// Record the trace now, for the test `ctx`.
    pub fn trace(&self, ctx: &TestContext) -> Result<(), TraceError> {
        self.scope.record(&self.target, ctx)
    }

    pub fn test<F, R>(&self, title: impl Into<String>, body: F) -> Deferred<F>
    where
        F: FnOnce(&TestContext) -> R,
    {
        Deferred {
            hook: self.clone(),
            title: title.into(),
            body,
        }
    }

    pub fn it<F, R>(&self, title: impl Into<String>, body: F) -> Deferred<F>
    where
        F: FnOnce(&TestContext) -> R,
    {
        self.test(title, body)
    }

    pub fn specify<F, R>(&self, title: impl Into<String>, body: F) -> Deferred<F>
    where
        F: FnOnce(&TestContext) -> R,
    {
        self.test(title, body)
    }

    /// A group of tests. Its body receives the group's context to nest
    /// further tests under.
    pub fn describe<F, R>(&self, title: impl Into<String>, body: F) -> Deferred<F>
    where
        F: FnOnce(&TestContext) -> R,
    {
        self.test(title, body)
    }

    pub fn context<F, R>(&self, title: impl Into<String>, body: F) -> Deferred<F>
    where
        F: FnOnce(&TestContext) -> R,
    {
        self.describe(title, body)
    }

    pub fn suite<F, R>(&self, title: impl Into<String>, body: F) -> Deferred<F>
    where
        F: FnOnce(&TestContext) -> R,
    {
        self.describe(title, body)
    }
}

/// A declared test or group that has not run yet.
#[derive(Debug)]
pub struct Deferred<F> {
    hook: RequirementHook,
    title: String,
    body: F,
}

impl<F> Deferred<F> {
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Trace the requirement for this test, then run it.
    pub fn run<R>(self, parent: &TestContext) -> Result<R, TraceError>
    where
        F: FnOnce(&TestContext) -> R,
    {
        let ctx = parent.child(self.title);
        self.hook.trace(&ctx)?;
        Ok((self.body)(&ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::by_prefix;

    fn recorder() -> FeatureRecorder {
        FeatureRecorder::new("Login").group("Auth").structure(
            Structure::new()
                .with_category(
                    "High",
                    Structure::new()
                        .with_requirement("REQ-1 valid password")
                        .with_requirement("REQ-2 wrong password"),
                )
                .with_category(
                    "Low",
                    Structure::new()
                        .with_requirement("REQ-3 remember me")
                        .with_category(
                            "Sub",
                            Structure::new().with_requirement("REQ-4 forgot password"),
                        ),
                ),
        )
    }

    fn ctx(title: &str) -> TestContext {
        TestContext::new("test/login.rs").child("login").child(title)
    }

    fn path(segments: &[&str]) -> RequirementRef {
        RequirementRef::Path(segments.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn traces_names_relative_to_category() {
        let recorder = recorder();
        let high = recorder.category(&["High"]);
        high.trace("REQ-2 wrong password", &ctx("t1")).unwrap();

        let records = recorder.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].requirement, RequirementRef::from("REQ-2 wrong password"));
        assert_eq!(records[0].category.as_deref(), Some(&["High".to_string()][..]));
        assert_eq!(records[0].title, "t1");
        assert_eq!(records[0].title_path, ["login", "t1"]);
        assert_eq!(records[0].file_path, "test/login.rs");
    }

    #[test]
    fn tracing_a_category_fails() {
        let recorder = recorder();
        recorder
            .trace(["High", "REQ-1 valid password"], &ctx("t1"))
            .unwrap();

        let err = recorder.trace("High", &ctx("t2")).unwrap_err();
        assert_eq!(
            err,
            TraceError::CategoryTraced {
                path: vec!["High".into()]
            }
        );
        let err = recorder.category(&["Low"]).trace(["Sub"], &ctx("t3")).unwrap_err();
        assert!(matches!(err, TraceError::CategoryTraced { .. }));
        assert_eq!(recorder.records().len(), 1);
    }

    #[test]
    fn tracing_a_category_declared_with_odd_spacing_fails() {
        let recorder = FeatureRecorder::new("Login").structure(
            Structure::new().with_category("High  Level", Structure::new().with_requirement("Req  A")),
        );
        let err = recorder.trace("High  Level", &ctx("t1")).unwrap_err();
        assert_eq!(
            err,
            TraceError::CategoryTraced {
                path: vec!["High Level".into()]
            }
        );
        assert!(recorder.records().is_empty());

        recorder
            .category(&["High Level"])
            .trace("Req A", &ctx("t2"))
            .unwrap();
        assert_eq!(recorder.records().len(), 1);
    }

    #[test]
    fn tracing_below_a_requirement_fails() {
        let recorder = recorder();
        let err = recorder
            .trace(["High", "REQ-1 valid password", "deeper"], &ctx("t1"))
            .unwrap_err();
        assert!(matches!(err, TraceError::Unresolved { .. }));
    }

    #[test]
    fn undeclared_requirements_can_be_traced() {
        let recorder = recorder();
        recorder.trace("Surprise", &ctx("t1")).unwrap();
        assert_eq!(recorder.records()[0].requirement, RequirementRef::from("Surprise"));
    }

    #[test]
    fn installed_matcher_is_inherited_by_categories() {
        let recorder = recorder();
        recorder.set_trace_to_requirement_matcher(Some(by_prefix()));

        recorder.category(&["Low"]).trace("REQ-3", &ctx("t1")).unwrap();
        recorder.trace("REQ-1", &ctx("t2")).unwrap();

        let records = recorder.records();
        assert_eq!(records[0].requirement, path(&["Low", "REQ-3 remember me"]));
        assert_eq!(records[0].category, None);
        assert_eq!(records[1].requirement, path(&["High", "REQ-1 valid password"]));
    }

    #[test]
    fn clearing_a_matcher_falls_back_to_the_parent() {
        let recorder = recorder();
        let low = recorder.category(&["Low"]);
        let sub = low.category(&["Sub"]);
        low.set_trace_to_requirement_matcher(Some(by_prefix()));
        sub.set_trace_to_requirement_matcher(Some(Rc::new(|_: &MatchParams<'_>| {
            Some(vec!["Low".into(), "REQ-3 remember me".into()])
        })));

        sub.trace("REQ-4", &ctx("t1")).unwrap();
        sub.set_trace_to_requirement_matcher(None);
        assert!(sub.matcher().is_some());
        sub.trace("REQ-4", &ctx("t2")).unwrap();

        let records = recorder.records();
        assert_eq!(records[0].requirement, path(&["Low", "REQ-3 remember me"]));
        assert_eq!(
            records[1].requirement,
            path(&["Low", "Sub", "REQ-4 forgot password"])
        );
    }

    #[test]
    fn matcher_failure_is_unresolved() {
        let recorder = recorder();
        recorder.set_trace_to_requirement_matcher(Some(by_prefix()));
        let err = recorder.trace("REQ-99", &ctx("t1")).unwrap_err();
        assert_eq!(
            err,
            TraceError::Unresolved {
                reference: "REQ-99".into()
            }
        );

        let empty = TraceTarget::matcher(|_| Some(Vec::new()));
        assert!(recorder.trace(empty, &ctx("t2")).is_err());
        assert!(recorder.records().is_empty());
    }

    #[test]
    fn one_off_matcher_sees_the_scope() {
        let recorder = recorder();
        let high = recorder.category(&["High"]);
        let target = TraceTarget::matcher(|params| {
            let Some(Branch::Category(branch)) = params.branch else {
                return None;
            };
            let (first, _) = branch.iter().next()?;
            let mut path = params.category_path.to_vec();
            path.push(first.to_string());
            Some(path)
        });
        high.trace(target, &ctx("t1")).unwrap();
        assert_eq!(
            recorder.records()[0].requirement,
            path(&["High", "REQ-1 valid password"])
        );
    }

    #[test]
    fn hooks_record_only_when_run() {
        let recorder = recorder();
        let hook = recorder.category(&["High"]).requirement("REQ-1 valid password");
        let file = TestContext::new("test/login.rs");

        let skipped = hook.it("is skipped", |_| ());
        assert_eq!(skipped.title(), "is skipped");
        drop(skipped);
        assert!(recorder.records().is_empty());

        let ran = hook
            .describe("login", |group| {
                let inner = recorder.requirement(["Low", "REQ-3 remember me"]);
                inner.test("remembers", |ctx| ctx.title_path.clone()).run(group)
            })
            .run(&file)
            .unwrap()
            .unwrap();
        assert_eq!(ran, ["login", "remembers"]);

        let records = recorder.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title_path, ["login"]);
        assert_eq!(records[1].title_path, ["login", "remembers"]);

        hook.trace(&ctx("direct")).unwrap();
        assert_eq!(recorder.records().len(), 3);
    }

    #[test]
    fn recording_carries_unseeded_structure() {
        let recorder = recorder()
            .description("Signing in")
            .headers(["Requirement", "Covered"]);
        recorder.trace("REQ-1 valid password", &ctx("t1")).unwrap();

        let recording = recorder.to_recording();
        assert_eq!(recording.title, "Login");
        assert_eq!(recording.group, "Auth");
        assert_eq!(recording.description, "Signing in");
        assert_eq!(recording.headers, ["Requirement", "Covered"]);
        assert_eq!(recording.records.len(), 1);
        assert_eq!(leaf_paths(&recording.structure).len(), 4);
    }
}
