use std::fmt;

use itertools::Itertools;
use tracing::{debug, instrument};
use typed_generational_arena::StandardSlabIndex;

use crate::ir::{Id, SectionKind, Type};

use super::{
    BuildError, ModuleBuilder, ModuleToken,
    values::{Component, ShaderType, ShaderValue, Vector},
};

pub type FnIndex = StandardSlabIndex<FunctionRecord>;

/// The body callback of a function, run once on first invocation with
/// handles to its parameters.
pub type FunctionBody<'a, R, P> =
    Box<dyn FnOnce(&mut FunctionBuilder<'_>, P) -> Result<R, BuildError> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionState {
    Declared,
    Recording,
    Finished,
}

/// What the module remembers about a declared function.
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    pub id: Id,
    pub name: String,
    pub return_type: Type,
    pub parameters: Vec<Type>,
    pub state: FunctionState,
}

impl FunctionRecord {
    pub fn ty(&self) -> Type {
        Type::function(self.return_type.clone(), self.parameters.clone())
    }
}

/// The instructions of one function while it is being recorded.
///
/// Variables are kept apart from the body so they can be emitted first,
/// whenever the callback declared them.
#[derive(Debug, Clone)]
pub struct FunctionBlock {
    index: FnIndex,
    name: String,
    header: String,
    parameters: Vec<String>,
    label: Id,
    variables: Vec<String>,
    body: Vec<String>,
    /// Debug names, only emitted once the function is finished.
    names: Vec<String>,
    finished: bool,
}

impl FunctionBlock {
    pub fn new(index: FnIndex, name: &str, header: String, label: Id) -> Self {
        Self {
            index,
            name: name.to_string(),
            header,
            parameters: Vec::new(),
            label,
            variables: Vec::new(),
            body: Vec::new(),
            names: Vec::new(),
            finished: false,
        }
    }

    pub fn index(&self) -> FnIndex {
        self.index
    }

    pub fn push_parameter(&mut self, line: String) -> Result<(), BuildError> {
        self.check_open()?;
        self.parameters.push(line);
        Ok(())
    }

    pub fn push_variable(&mut self, line: String) -> Result<(), BuildError> {
        self.check_open()?;
        self.variables.push(line);
        Ok(())
    }

    pub fn push(&mut self, line: String) -> Result<(), BuildError> {
        self.check_open()?;
        self.body.push(line);
        Ok(())
    }

    pub fn push_name(&mut self, line: String) -> Result<(), BuildError> {
        self.check_open()?;
        self.names.push(line);
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Appends the terminator and returns the complete definition.
    pub fn finish(&mut self, terminator: String) -> Result<Vec<String>, BuildError> {
        self.check_open()?;
        self.finished = true;

        let mut lines = Vec::with_capacity(
            self.parameters.len() + self.variables.len() + self.body.len() + 4,
        );
        lines.push(self.header.clone());
        lines.extend(self.parameters.iter().cloned());
        lines.push(format!("{} = OpLabel", self.label));
        lines.extend(self.variables.iter().cloned());
        lines.extend(self.body.iter().cloned());
        lines.push(terminator);
        lines.push("OpFunctionEnd".to_string());
        Ok(lines)
    }

    fn check_open(&self) -> Result<(), BuildError> {
        if self.finished {
            Err(BuildError::FunctionFinished {
                name: self.name.clone(),
            })
        } else {
            Ok(())
        }
    }
}

/// Mutable access to the function currently being recorded.
///
/// Only handed to body callbacks, so instructions can't be emitted outside a
/// recording.
pub struct FunctionBuilder<'m> {
    pub(crate) module: &'m mut ModuleBuilder,
}

impl fmt::Debug for FunctionBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBuilder")
            .field("open_blocks", &self.module.open_blocks.len())
            .finish_non_exhaustive()
    }
}

impl FunctionBuilder<'_> {
    /// Invokes another function from the one being recorded.
    pub fn call<R: ReturnValue>(&mut self, callee: &mut Callable<'_, R>) -> Result<R, BuildError> {
        callee.invoke_with(self.module, ())
    }

    /// Invokes a function taking parameters, passing `arguments` by value.
    pub fn call_with<R: ReturnValue, P: Parameters>(
        &mut self,
        callee: &mut Callable<'_, R, P>,
        arguments: P,
    ) -> Result<R, BuildError> {
        callee.invoke_with(self.module, arguments)
    }

    /// Attaches a debug name to a value used in this function.
    ///
    /// The name is dropped if the recording fails.
    pub fn set_debug_name<V: ShaderValue>(&mut self, value: &V, name: &str) -> Result<(), BuildError> {
        validate_debug_name(name)?;
        self.module
            .current_block_mut()?
            .push_name(format!("OpName {} \"{}\"", value.id(), name))
    }

    /// Fails if `id` is a local variable of another function.
    pub(crate) fn check_local(&self, id: Id) -> Result<(), BuildError> {
        let Some(owner) = self.module.locals.get(&id) else {
            return Ok(());
        };
        if self.module.open_blocks.last().map(FunctionBlock::index) == Some(*owner) {
            return Ok(());
        }
        Err(BuildError::ForeignValue {
            value: id.to_string(),
            function: self
                .module
                .functions
                .get(*owner)
                .map(|record| record.name.clone())
                .unwrap_or_default(),
        })
    }

    /// Declares one parameter and copies it into a local variable, so the
    /// body sees it like any other value.
    fn bind_parameter<V: ShaderValue>(&mut self) -> Result<V, BuildError> {
        let ty = V::ty();
        let descriptor = self.module.types.register(&mut self.module.sections, &ty);
        let parameter = self.module.ids.next_id();
        self.module.current_block_mut()?.push_parameter(format!(
            "{} = OpFunctionParameter {}",
            parameter, descriptor.identifier
        ))?;

        let storage = self.local_variable(&ty)?;
        self.module
            .current_block_mut()?
            .push(format!("OpStore {} {}", storage, parameter))?;
        Ok(V::from_storage(storage))
    }

    /// Loads each argument so it can be passed by value.
    fn load_arguments<P: Parameters>(&mut self, arguments: &P) -> Result<Vec<Id>, BuildError> {
        let mut loaded = Vec::new();
        for (ty, argument) in P::types().iter().zip(arguments.ids()) {
            self.check_local(argument)?;
            let descriptor = self.module.types.register(&mut self.module.sections, ty);
            let id = self.module.ids.next_id();
            self.module.current_block_mut()?.push(format!(
                "{} = OpLoad {} {}",
                id, descriptor.identifier, argument
            ))?;
            loaded.push(id);
        }
        Ok(loaded)
    }
}

/// The parameter list of a function: a tuple of up to four values.
pub trait Parameters: Sized {
    fn types() -> Vec<Type>;

    /// Declares the parameters in the function being recorded.
    fn bind(function: &mut FunctionBuilder<'_>) -> Result<Self, BuildError>;

    /// Storage ids of the arguments at a call site.
    fn ids(&self) -> Vec<Id>;
}

macro_rules! parameters {
    ($($ty:ident $value:ident),*) => {
        impl<$($ty: ShaderValue),*> Parameters for ($($ty,)*) {
            fn types() -> Vec<Type> {
                vec![$($ty::ty()),*]
            }

            #[allow(unused_variables)]
            fn bind(function: &mut FunctionBuilder<'_>) -> Result<Self, BuildError> {
                Ok(($(function.bind_parameter::<$ty>()?,)*))
            }

            fn ids(&self) -> Vec<Id> {
                let ($($value,)*) = self;
                vec![$($value.id()),*]
            }
        }
    };
}

parameters!();
parameters!(A a);
parameters!(A a, B b);
parameters!(A a, B b, C c);
parameters!(A a, B b, C c, D d);

fn call_line(result: Id, ret: &str, callee: Id, arguments: &[Id]) -> String {
    format!(
        "{} = OpFunctionCall {} {}",
        result,
        ret,
        std::iter::once(&callee).chain(arguments).join(" ")
    )
}

/// A type a function can return.
pub trait ReturnValue: ShaderType + Sized {
    /// Emits whatever is needed before the terminator and returns it.
    fn emit_return(&self, function: &mut FunctionBuilder<'_>) -> Result<String, BuildError>;

    /// Emits a call to `callee` in the function being recorded.
    fn emit_call(
        function: &mut FunctionBuilder<'_>,
        callee: Id,
        arguments: &[Id],
    ) -> Result<Self, BuildError>;
}

impl ReturnValue for () {
    fn emit_return(&self, _function: &mut FunctionBuilder<'_>) -> Result<String, BuildError> {
        Ok("OpReturn".to_string())
    }

    fn emit_call(
        function: &mut FunctionBuilder<'_>,
        callee: Id,
        arguments: &[Id],
    ) -> Result<Self, BuildError> {
        let ret = function
            .module
            .types
            .register(&mut function.module.sections, &Type::Void);
        let result = function.module.ids.next_id();
        function
            .module
            .current_block_mut()?
            .push(call_line(result, &ret.identifier, callee, arguments))
    }
}

impl<T: Component, const N: usize> ReturnValue for Vector<T, N> {
    fn emit_return(&self, function: &mut FunctionBuilder<'_>) -> Result<String, BuildError> {
        function.check_local(self.id())?;
        let ty = function
            .module
            .types
            .register(&mut function.module.sections, &<Self as ShaderType>::ty());
        let loaded = function.module.ids.next_id();
        function
            .module
            .current_block_mut()?
            .push(format!("{} = OpLoad {} {}", loaded, ty.identifier, self.id()))?;
        Ok(format!("OpReturnValue {}", loaded))
    }

    fn emit_call(
        function: &mut FunctionBuilder<'_>,
        callee: Id,
        arguments: &[Id],
    ) -> Result<Self, BuildError> {
        let ty = <Self as ShaderType>::ty();
        let descriptor = function.module.types.register(&mut function.module.sections, &ty);
        let storage = function.local_variable(&ty)?;
        let result = function.module.ids.next_id();

        let block = function.module.current_block_mut()?;
        block.push(call_line(result, &descriptor.identifier, callee, arguments))?;
        block.push(format!("OpStore {} {}", storage, result))?;
        Ok(Self::from_storage(storage))
    }
}

/// A declared function, recorded on first invocation and called afterwards.
pub struct Callable<'a, R, P = ()> {
    module: ModuleToken,
    index: FnIndex,
    id: Id,
    name: String,
    body: Option<FunctionBody<'a, R, P>>,
}

impl<R, P> fmt::Debug for Callable<'_, R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("recorded", &self.body.is_none())
            .finish()
    }
}

impl<R: ReturnValue> Callable<'_, R> {
    /// Runs a function without parameters. See [`Callable::invoke_with`].
    pub fn invoke(&mut self, module: &mut ModuleBuilder) -> Result<R, BuildError> {
        self.invoke_with(module, ())
    }
}

impl<R: ReturnValue, P: Parameters> Callable<'_, R, P> {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the function.
    ///
    /// The first invocation records the body. When that happens inside
    /// another recording, or on any later invocation, a call site passing
    /// `arguments` is emitted into the function being recorded. A first
    /// invocation at top level has no caller, so `arguments` go unused.
    #[instrument(level = "debug", skip_all, fields(function = %self.name))]
    pub fn invoke_with(&mut self, module: &mut ModuleBuilder, arguments: P) -> Result<R, BuildError> {
        let state = module.callable_record(self)?.state;

        match state {
            FunctionState::Declared => {
                let body = self.body.take().ok_or_else(|| BuildError::AbortedFunction {
                    name: self.name.clone(),
                })?;
                let nested = !module.open_blocks.is_empty();
                let value = module.record_function(self.index, body)?;
                if nested {
                    self.emit_call(module, &arguments)
                } else {
                    Ok(value)
                }
            }
            FunctionState::Recording if module.is_open(self.index) => {
                Err(BuildError::RecursiveCall {
                    name: self.name.clone(),
                })
            }
            FunctionState::Recording => Err(BuildError::AbortedFunction {
                name: self.name.clone(),
            }),
            FunctionState::Finished => {
                if module.open_blocks.is_empty() {
                    return Err(BuildError::NoActiveFunction);
                }
                self.emit_call(module, &arguments)
            }
        }
    }

    fn emit_call(&self, module: &mut ModuleBuilder, arguments: &P) -> Result<R, BuildError> {
        let mut function = FunctionBuilder { module };
        let loaded = function.load_arguments(arguments)?;
        R::emit_call(&mut function, self.id, &loaded)
    }
}

impl ModuleBuilder {
    /// Declares a function without parameters. Nothing is emitted until it
    /// is first invoked.
    pub fn create_function<'a, R, F>(&mut self, name: &str, body: F) -> Result<Callable<'a, R>, BuildError>
    where
        R: ReturnValue,
        F: FnOnce(&mut FunctionBuilder<'_>) -> Result<R, BuildError> + 'a,
    {
        self.create_function_with(name, move |function, ()| body(function))
    }

    /// Declares a function whose body receives handles to its parameters.
    #[instrument(level = "debug", skip_all, fields(name = %name))]
    pub fn create_function_with<'a, R, P, F>(
        &mut self,
        name: &str,
        body: F,
    ) -> Result<Callable<'a, R, P>, BuildError>
    where
        R: ReturnValue,
        P: Parameters,
        F: FnOnce(&mut FunctionBuilder<'_>, P) -> Result<R, BuildError> + 'a,
    {
        validate_debug_name(name)?;

        let return_type = R::ty();
        let parameters = P::types();
        self.types.register(
            &mut self.sections,
            &Type::function(return_type.clone(), parameters.clone()),
        );

        let id = self.ids.next_id();
        let index = self.functions.insert(FunctionRecord {
            id,
            name: name.to_string(),
            return_type,
            parameters,
            state: FunctionState::Declared,
        });
        debug!("declared function {} as {}", name, id);

        Ok(Callable {
            module: self.token,
            index,
            id,
            name: name.to_string(),
            body: Some(Box::new(body)),
        })
    }

    fn is_open(&self, index: FnIndex) -> bool {
        self.open_blocks.iter().any(|block| block.index() == index)
    }

    /// The record behind a callable, if it was declared by this module.
    pub(crate) fn callable_record<R, P>(
        &self,
        callable: &Callable<'_, R, P>,
    ) -> Result<&FunctionRecord, BuildError> {
        Some(callable.module)
            .filter(|token| *token == self.token)
            .and_then(|_| self.functions.get(callable.index))
            .filter(|record| record.id == callable.id)
            .ok_or_else(|| BuildError::UnknownFunction {
                name: callable.name.clone(),
            })
    }

    /// Records a function body on a fresh block and moves the finished
    /// definition into the module.
    fn record_function<R: ReturnValue, P: Parameters>(
        &mut self,
        index: FnIndex,
        body: FunctionBody<'_, R, P>,
    ) -> Result<R, BuildError> {
        let record = &mut self.functions[index];
        record.state = FunctionState::Recording;
        let (id, name) = (record.id, record.name.clone());
        let header = format!(
            "{} = OpFunction {} None {}",
            id,
            record.return_type.identifier(),
            record.ty().identifier()
        );

        let label = self.ids.next_id();
        self.open_blocks
            .push(FunctionBlock::new(index, &name, header, label));
        debug!("recording function {}", name);

        let result = {
            let mut function = FunctionBuilder { module: self };
            P::bind(&mut function)
                .and_then(|parameters| body(&mut function, parameters))
                .and_then(|value| {
                    let terminator = value.emit_return(&mut function)?;
                    Ok((value, terminator))
                })
        };

        // Popped even on failure so the caller's block is on top again. The
        // record stays `Recording` and is never entered again.
        let mut block = self.open_blocks.pop().ok_or(BuildError::NoActiveFunction)?;
        let (value, terminator) = result?;

        for line in block.finish(terminator)? {
            self.sections.append(SectionKind::FunctionDefinitions, line);
        }
        self.sections
            .append(SectionKind::DebugNames, format!("OpName {} \"{}\"", id, name));
        for line in block.names() {
            self.sections.append(SectionKind::DebugNames, line.clone());
        }
        self.functions[index].state = FunctionState::Finished;
        debug!("finished function {}", name);

        Ok(value)
    }
}

/// Names end up inside quoted strings of the module text.
pub(crate) fn validate_debug_name(name: &str) -> Result<(), BuildError> {
    if name.is_empty() {
        return Err(BuildError::InvalidName {
            name: name.to_string(),
            reason: "names can't be empty",
        });
    }
    if name.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
        return Err(BuildError::InvalidName {
            name: name.to_string(),
            reason: "names can't contain quotes, backslashes or control characters",
        });
    }
    Ok(())
}
