// SPDX-License-Identifier: AGPL-3.0-or-later

//! Application callbacks (spec.md §6), in the registrar/handler-set form
//! chosen uniformly over the source's dual forwarder/registrar patterns
//! (Open Question #1 — see DESIGN.md). Each callback has a `set_*` that
//! also deregisters when passed `None`.

pub type UpdateUserInterfaceFn = Box<dyn Fn(u16, u16) + Send + Sync>;
pub type UpdateDiagnosticsFn = Box<dyn Fn(u16, u16) + Send + Sync>;
pub type GetDpIndexFn = Box<dyn Fn(u16, u16, i32) -> i32 + Send + Sync>;
pub type GetWidthFn = Box<dyn Fn(u16) -> u16 + Send + Sync>;
pub type CreateCsmoFn = Box<dyn Fn(u16) -> Vec<u8> + Send + Sync>;
pub type GetPrimaryGroupFn = Box<dyn Fn(u16) -> u8 + Send + Sync>;
pub type GetAssemblyFn = Box<dyn Fn(&[u8], bool, i32) -> i32 + Send + Sync>;
pub type QueryHeartbeatFn = Box<dyn Fn(u16) -> bool + Send + Sync>;
pub type CreatePeriodicMsgFn = Box<dyn Fn() -> Option<Vec<u8>> + Send + Sync>;

/// Handler set the application registers with [`crate::isi::IsiEngine`].
#[derive(Default)]
pub struct IsiCallbacks {
    pub update_user_interface: Option<UpdateUserInterfaceFn>,
    pub update_diagnostics: Option<UpdateDiagnosticsFn>,
    pub get_dp_index: Option<GetDpIndexFn>,
    pub get_width: Option<GetWidthFn>,
    pub create_csmo: Option<CreateCsmoFn>,
    pub get_primary_group: Option<GetPrimaryGroupFn>,
    pub get_assembly: Option<GetAssemblyFn>,
    pub query_heartbeat: Option<QueryHeartbeatFn>,
    pub create_periodic_msg: Option<CreatePeriodicMsgFn>,
}

impl IsiCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_update_user_interface(&mut self, f: Option<UpdateUserInterfaceFn>) {
        self.update_user_interface = f;
    }

    pub fn set_update_diagnostics(&mut self, f: Option<UpdateDiagnosticsFn>) {
        self.update_diagnostics = f;
    }

    pub fn set_get_dp_index(&mut self, f: Option<GetDpIndexFn>) {
        self.get_dp_index = f;
    }

    pub fn set_get_width(&mut self, f: Option<GetWidthFn>) {
        self.get_width = f;
    }

    pub fn set_create_csmo(&mut self, f: Option<CreateCsmoFn>) {
        self.create_csmo = f;
    }

    pub fn set_get_primary_group(&mut self, f: Option<GetPrimaryGroupFn>) {
        self.get_primary_group = f;
    }

    pub fn set_get_assembly(&mut self, f: Option<GetAssemblyFn>) {
        self.get_assembly = f;
    }

    pub fn set_query_heartbeat(&mut self, f: Option<QueryHeartbeatFn>) {
        self.query_heartbeat = f;
    }

    pub fn set_create_periodic_msg(&mut self, f: Option<CreatePeriodicMsgFn>) {
        self.create_periodic_msg = f;
    }

    pub fn notify_diagnostics(&self, event: u16, parameter: u16) {
        if let Some(cb) = &self.update_diagnostics {
            cb(event, parameter);
        }
    }

    pub fn notify_ui(&self, event: u16, parameter: u16) {
        if let Some(cb) = &self.update_user_interface {
            cb(event, parameter);
        }
    }
}
