//! Manifest templates and the data they render

use serde::{Deserialize, Serialize};

pub const NAMESPACE_TEMPLATE: &str = "\
apiVersion: v1
kind: Namespace
metadata:
  name: {{ name }}
";

pub const SERVICE_TEMPLATE: &str = "\
apiVersion: v1
kind: Service
metadata:
  name: {{ name }}
  labels:
    app: {{ name }}
  namespace: {{ namespace }}
spec:
  ports:
{%- for port in ports %}
  - name: {{ port.name }}
    protocol: {{ port.protocol }}
    port: {{ port.port }}
    targetPort: {{ port.target_port }}
{%- endfor %}
  selector:
    app: {{ name }}
  type: ClusterIP
";

pub const REPLICATION_CONTROLLER_TEMPLATE: &str = "\
apiVersion: v1
kind: ReplicationController
metadata:
  name: {{ name }}
  namespace: {{ namespace }}
spec:
  replicas: 1
  selector:
    app: {{ name }}
  template:
    metadata:
      name: {{ name }}
      labels:
        app: {{ name }}
    spec:
{%- if node_name %}
      nodeName: {{ node_name }}
{%- endif %}
      containers:
      - name: {{ name }}
        image: {{ image }}
        imagePullPolicy: Always
{%- if args %}
        args:
{%- for arg in args %}
        - {{ arg.key }}={{ arg.value }}
{%- endfor %}
{%- endif %}
{%- if commands %}
        command:
{%- for command in commands %}
          - {{ command }}
{%- endfor %}
{%- endif %}
{%- if ports %}
        ports:
{%- for port in ports %}
        - name: {{ port.name }}
          protocol: {{ port.protocol }}
          containerPort: {{ port.port }}
{%- endfor %}
{%- endif %}
{%- if envs %}
        env:
{%- for env in envs %}
        - name: {{ env.name }}
{%- if env.field_value %}
          valueFrom:
            fieldRef:
              fieldPath: {{ env.field_value }}
{%- else %}
          value: \"{{ env.value }}\"
{%- endif %}
{%- endfor %}
{%- endif %}
{%- if resource_request.cpu or resource_request.memory %}
        resources:
          requests:
{%- if resource_request.cpu %}
            cpu: {{ resource_request.cpu }}
{%- endif %}
{%- if resource_request.memory %}
            memory: {{ resource_request.memory }}
{%- endif %}
{%- endif %}
";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub protocol: String,
    pub port: u16,
    pub target_port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodPort {
    pub name: String,
    pub protocol: String,
    pub port: u16,
}

/// Container environment variable, either a literal or a field reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    pub name: String,
    #[serde(default)]
    pub value: String,
    /// e.g. `status.podIP`; takes precedence over `value`
    #[serde(default)]
    pub field_value: String,
}

/// Rendered as `key=value`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arg {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub memory: String,
}

/// Single-replica controller pinned to an optional node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationController {
    pub name: String,
    pub namespace: String,
    pub image: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub args: Vec<Arg>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub ports: Vec<PodPort>,
    #[serde(default)]
    pub resource_request: ResourceRequest,
    #[serde(default)]
    pub envs: Vec<Env>,
}
