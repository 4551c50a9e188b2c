//! The registration ABI: events emitted by the native module while it loads.
//!
//! Every entry point reads its string and list arguments out of native
//! memory, records the result in the context and logs it at debug level.
//! Any error raised here poisons the context.

use std::rc::Rc;

use wirebind_core::{BindError, ClassIndex, MemoryPool, PolicyFlags, PrimitiveFlags, SignatureKind, TypeId, TypeKind};
use wirebind_registry::TypeRef;

use crate::BindingContext;
use crate::class::{BoundClass, ClassIds, FREE};
use crate::invoker::{Invoker, NativeTarget, Receiver};
use crate::overload::remove_accessor_prefix;

/// Owner label of free functions in collision reports.
const MODULE_OWNER: &str = "module";

impl BindingContext {
    /// `registerType(id, namePointer)`
    pub fn register_type(&self, id: u32, name_ptr: u32) -> Result<(), BindError> {
        self.guard_registration(|| {
            let name = self.memory().read_cstr(name_ptr)?;
            self.types_mut().register_type(id, &name)?;
            Ok(())
        })
    }

    /// `registerPrimitive(id, sizeBytes, flagBits)`
    pub fn register_primitive(&self, id: u32, size: u32, flags: u32) -> Result<(), BindError> {
        self.guard_registration(|| {
            let flags = PrimitiveFlags::from_bits_truncate(flags);
            self.types_mut().register_primitive(id, size, flags)?;
            Ok(())
        })
    }

    /// `registerClass(idTriplePointer, namePointer)`
    ///
    /// Creates the bound class, its three descriptors and its namespace export.
    pub fn register_class(&self, id_triple_ptr: u32, name_ptr: u32) -> Result<(), BindError> {
        self.guard_registration(|| {
            let memory = self.memory();
            let ids = memory.read_u32_list(id_triple_ptr, 3)?;
            let name = memory.read_cstr(name_ptr)?;
            let index = ClassIndex(self.class_count() as u32);

            {
                let mut types = self.types_mut();
                types.register_class(ids[0], &name, TypeKind::Class, index)?;
                types.register_class(ids[1], &format!("{name} *"), TypeKind::ClassPointer, index)?;
                types.register_class(ids[2], &format!("const {name} *"), TypeKind::ConstClassPointer, index)?;
            }

            let class_ids = ClassIds {
                value: TypeId(ids[0]),
                pointer: TypeId(ids[1]),
                const_pointer: TypeId(ids[2]),
            };
            tracing::debug!(class = %name, ?class_ids, "class registered");
            self.push_class(Rc::new(BoundClass::new(name, index, class_ids)));
            Ok(())
        })
    }

    /// `registerConstructor(classTypeId, policyListPointer, typeIdListPointer,
    /// typeCount, constructAddress, constructInPlaceAddress)`
    ///
    /// `typeCount` includes the leading return slot, which is ignored: the
    /// allocating constructor returns a pointer and the in-place one returns
    /// nothing.
    pub fn register_constructor(
        &self,
        class_type: u32,
        policy_ptr: u32,
        type_list_ptr: u32,
        type_count: u32,
        construct: u32,
        construct_in_place: u32,
    ) -> Result<(), BindError> {
        self.guard_registration(|| {
            let class = self.class_by_type(class_type)?;
            if type_count == 0 {
                return Err(BindError::EmptyTypeList(format!("{} constructor", class.name())));
            }
            let ids = self.memory().read_u32_list(type_list_ptr, type_count)?;
            let policies = self.read_policies(policy_ptr, type_count - 1)?;
            let args: Vec<TypeRef<'_>> = ids[1..].iter().map(|&id| TypeRef::Id(id)).collect();

            let mut refs = vec![TypeRef::Name("uint32_t")];
            refs.extend_from_slice(&args);
            let allocating = Invoker::new(
                class.name(),
                NativeTarget::Direct(construct),
                self.resolve_types(&refs)?,
                policies.clone(),
                Receiver::Static,
            )?;

            let mut refs = vec![TypeRef::Name("void"), TypeRef::Name("uint32_t")];
            refs.extend_from_slice(&args);
            let mut in_place_policies = Vec::with_capacity(policies.len() + 1);
            in_place_policies.push(PolicyFlags::empty());
            in_place_policies.extend(policies);
            let in_place = Invoker::new(
                class.name(),
                NativeTarget::Direct(construct_in_place),
                self.resolve_types(&refs)?,
                in_place_policies,
                Receiver::Static,
            )?;

            tracing::debug!(class = class.name(), arity = args.len(), construct, construct_in_place, "constructor registered");
            self.add_overload(class.constructors(), class.name(), BoundClass::constructor_key(false), Rc::new(allocating))?;
            self.add_overload(class.constructors(), class.name(), BoundClass::constructor_key(true), Rc::new(in_place))
        })
    }

    /// `registerDestructor(classTypeId, destructAddress)`
    pub fn register_destructor(&self, class_type: u32, address: u32) -> Result<(), BindError> {
        self.guard_registration(|| {
            let class = self.class_by_type(class_type)?;
            let invoker = Invoker::new(
                FREE,
                NativeTarget::Dispatch { address, number: 0 },
                self.resolve_types(&[TypeRef::Name("void")])?,
                Vec::new(),
                Receiver::Instance(class.ids().value),
            )?;
            tracing::debug!(class = class.name(), address, "destructor registered");
            self.add_overload(class.prototype(), &format!("{}.prototype", class.name()), FREE, Rc::new(invoker))
        })
    }

    /// `registerFunction(classTypeIdOrZero, policyListPointer, typeIdListPointer,
    /// typeCount, address, namePointer, overloadNumber, directFlag)`
    ///
    /// A zero class id binds a free function on the module namespace; any
    /// other binds a static function of that class.
    #[allow(clippy::too_many_arguments)]
    pub fn register_function(
        &self,
        class_type: u32,
        policy_ptr: u32,
        type_list_ptr: u32,
        type_count: u32,
        address: u32,
        name_ptr: u32,
        number: u32,
        direct: u32,
    ) -> Result<(), BindError> {
        self.guard_registration(|| {
            let name = self.memory().read_cstr(name_ptr)?;
            let target = if direct != 0 {
                NativeTarget::Direct(direct)
            } else {
                NativeTarget::Dispatch { address, number }
            };
            let invoker = self.build_invoker(&name, target, policy_ptr, type_list_ptr, type_count, Receiver::Static)?;
            tracing::debug!(name = %name, signature = invoker.signature(), class_type, "function registered");

            if class_type == 0 {
                self.add_overload(self.namespace().functions(), MODULE_OWNER, &name, Rc::new(invoker))
            } else {
                let class = self.class_by_type(class_type)?;
                self.add_overload(class.statics(), class.name(), &name, Rc::new(invoker))
            }
        })
    }

    /// `registerMethod(classTypeId, policyListPointer, typeIdListPointer,
    /// typeCount, address, namePointer, overloadNumber, signatureKind)`
    #[allow(clippy::too_many_arguments)]
    pub fn register_method(
        &self,
        class_type: u32,
        policy_ptr: u32,
        type_list_ptr: u32,
        type_count: u32,
        address: u32,
        name_ptr: u32,
        number: u32,
        signature_kind: u32,
    ) -> Result<(), BindError> {
        self.guard_registration(|| {
            let kind = SignatureKind::try_from(signature_kind)
                .map_err(|_| BindError::InvalidSignatureKind(signature_kind))?;
            let class = self.class_by_type(class_type)?;
            let name = self.memory().read_cstr(name_ptr)?;
            let invoker = self.build_invoker(
                &name,
                NativeTarget::Dispatch { address, number },
                policy_ptr,
                type_list_ptr,
                type_count,
                Receiver::Instance(class.ids().value),
            )?;
            tracing::debug!(class = class.name(), name = %name, ?kind, signature = invoker.signature(), "method registered");

            let invoker = Rc::new(invoker);
            match kind {
                SignatureKind::Method => {
                    self.add_overload(class.prototype(), &format!("{}.prototype", class.name()), &name, invoker)
                }
                SignatureKind::Setter => {
                    class
                        .prototype()
                        .borrow_mut()
                        .stash_setter(&remove_accessor_prefix(&name), invoker);
                    Ok(())
                }
                SignatureKind::Getter => {
                    class
                        .prototype()
                        .borrow_mut()
                        .define_accessor(&remove_accessor_prefix(&name), invoker);
                    Ok(())
                }
            }
        })
    }

    /// `registerEndianness(byteFlag)`: 1 for big-endian, anything else little.
    pub fn register_endianness(&self, flag: u32) -> Result<(), BindError> {
        self.guard_registration(|| {
            let endianness = wirebind_core::Endianness::from_flag(flag);
            tracing::debug!(?endianness, "endianness registered");
            self.set_endianness(endianness);
            Ok(())
        })
    }

    /// `registerMemoryPool(pageSize, usedPointer, rootPointer, pagePointer)`
    pub fn register_memory_pool(&self, page_size: u32, used_offset: u32, root_pointer: u32, page_offset: u32) -> Result<(), BindError> {
        self.guard_registration(|| {
            let pool = MemoryPool {
                page_size,
                used_offset,
                root_pointer,
                page_offset,
            };
            tracing::debug!(?pool, "memory pool registered");
            self.set_memory_pool(pool);
            Ok(())
        })
    }

    /// Record the type list (return type first) of a callback shape native
    /// code will call through [`HostBridge::call_callback`](wirebind_core::HostBridge::call_callback).
    pub fn register_callback_signature(&self, type_list_ptr: u32, type_count: u32) -> Result<u32, BindError> {
        self.guard_registration(|| {
            if type_count == 0 {
                return Err(BindError::EmptyTypeList("callback signature".into()));
            }
            let types = self.read_type_list(type_list_ptr, type_count)?;
            let number = self.push_callback_signature(types);
            tracing::debug!(number, type_count, "callback signature registered");
            Ok(number)
        })
    }

    // ==========================================================================
    // Argument decoding
    // ==========================================================================

    fn read_type_list(&self, ptr: u32, count: u32) -> Result<Vec<Rc<wirebind_core::TypeDescriptor>>, BindError> {
        let ids = self.memory().read_u32_list(ptr, count)?;
        let refs: Vec<TypeRef<'_>> = ids.into_iter().map(TypeRef::Id).collect();
        self.resolve_types(&refs)
    }

    /// One policy word per argument; a null list means no policies.
    fn read_policies(&self, ptr: u32, count: u32) -> Result<Vec<PolicyFlags>, BindError> {
        if ptr == 0 {
            return Ok(vec![PolicyFlags::empty(); count as usize]);
        }
        Ok(self
            .memory()
            .read_u32_list(ptr, count)?
            .into_iter()
            .map(PolicyFlags::from_bits_truncate)
            .collect())
    }

    fn build_invoker(
        &self,
        name: &str,
        target: NativeTarget,
        policy_ptr: u32,
        type_list_ptr: u32,
        type_count: u32,
        receiver: Receiver,
    ) -> Result<Invoker, BindError> {
        if type_count == 0 {
            return Err(BindError::EmptyTypeList(name.to_string()));
        }
        let types = self.read_type_list(type_list_ptr, type_count)?;
        let policies = self.read_policies(policy_ptr, type_count - 1)?;
        Invoker::new(name, target, types, policies, receiver)
    }
}
